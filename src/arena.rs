// The arena service: the operations the controller process drives the
// simulation with.

use crate::config::RobotSettings;
use crate::debug_sched;
use crate::error::SimError;
use crate::robot::RobotService;
use crate::scheduler::{Actor, ActorKind};
use crate::scoring;
use crate::sim::SimHandle;
use log::info;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub struct ArenaService {
    ctx: SimHandle,
    actor: Arc<Actor>,
}

impl ArenaService {
    pub fn new(ctx: SimHandle, actor: Arc<Actor>) -> ArenaService {
        ArenaService { ctx, actor }
    }

    /// Creates the robot body and actor for one team and returns its service.
    /// The RPC layer wraps the service in an endpoint of its own.
    pub fn create_robot(&self, team: usize) -> Result<RobotService, SimError> {
        {
            let mut world = self.ctx.lock_world();
            if !world.is_running() {
                return Err(SimError::SimulationEnded);
            }
            let settings = RobotSettings::load(&self.ctx.config_dir, team)?;
            world.create_robot(team, &settings)?;
        }
        info!("Created robot for team {team}");
        let actor = self.ctx.scheduler.register(ActorKind::Robot(team));
        Ok(RobotService::new(self.ctx.clone(), actor, team))
    }

    /// Marks the arena ready, waits (with coarse polls) for every robot to be
    /// ready too, then suspends so the main loop can start ticking.
    pub fn wait_for_start(&self) -> bool {
        debug_sched!("entering ArenaService::wait_for_start");
        self.actor.mark_ready();
        while !self.ctx.scheduler.all_ready() {
            thread::sleep(Duration::from_secs(1));
        }
        // A controller reconnecting after shutdown must not re-enter the
        // scheduler; there is no main loop left to resume it.
        if self.ctx.scheduler.is_shutting_down() {
            return true;
        }
        debug_sched!("all robots ready, arena suspending");
        self.ctx.scheduler.block(&self.actor);
        true
    }

    /// Drains the queued robot output. Suspends for `duration` simulated
    /// seconds unless the simulation has already ended, in which case it
    /// flushes without suspending.
    pub fn wait_for_output(&self, duration: f64) -> (bool, Vec<String>) {
        debug_sched!("entering ArenaService::wait_for_output");
        let messages = {
            let mut world = self.ctx.lock_world();
            let messages = world.drain_output();
            if !world.is_running() {
                return (false, messages);
            }
            messages
        };
        self.actor.defer(duration);
        self.ctx.scheduler.block(&self.actor);
        debug_sched!("exiting ArenaService::wait_for_output");
        (true, messages)
    }

    /// Only valid once the simulation has ended.
    pub fn get_scores(&self) -> Result<[i32; 4], SimError> {
        let world = self.ctx.lock_world();
        if world.is_running() {
            return Err(SimError::OrderViolation(
                "scores are not available until the simulation has ended".to_string(),
            ));
        }
        Ok(scoring::compute_scores(&world))
    }

    /// Suspends one final time so the main loop can join every actor.
    pub fn terminate(&self) -> Result<bool, SimError> {
        if self.ctx.lock_world().is_running() {
            return Err(SimError::OrderViolation(
                "attempted to terminate before the simulation had ended".to_string(),
            ));
        }
        if !self.ctx.scheduler.is_shutting_down() {
            self.ctx.scheduler.block(&self.actor);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;
    use std::path::PathBuf;

    fn test_service(end_time: f64) -> ArenaService {
        let ctx = SimHandle::new(World::new(end_time, &[]), PathBuf::from("."));
        let actor = ctx.scheduler.register(ActorKind::Arena);
        ArenaService::new(ctx, actor)
    }

    #[test]
    fn test_scores_refused_while_running() {
        let arena = test_service(180.0);
        assert!(matches!(
            arena.get_scores(),
            Err(SimError::OrderViolation(_))
        ));
    }

    #[test]
    fn test_terminate_refused_while_running() {
        let arena = test_service(180.0);
        assert!(matches!(arena.terminate(), Err(SimError::OrderViolation(_))));
    }

    #[test]
    fn test_create_robot_refused_after_end() {
        let arena = test_service(0.0);
        match arena.create_robot(0) {
            Err(SimError::SimulationEnded) => {}
            Err(other) => panic!("expected SimulationEnded, got {other:?}"),
            Ok(_) => panic!("expected SimulationEnded, got a robot"),
        }
    }

    #[test]
    fn test_wait_for_output_flushes_after_end() {
        let arena = test_service(0.0);
        arena.ctx.lock_world().queue_print(1, "leftover");
        let (running, messages) = arena.wait_for_output(30.0);
        assert!(!running);
        assert_eq!(messages.len(), 1);
        // A second drain is empty but still returns without suspending.
        let (running, messages) = arena.wait_for_output(30.0);
        assert!(!running);
        assert!(messages.is_empty());
    }
}
