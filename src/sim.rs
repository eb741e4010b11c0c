// The simulation kernel: the tick loop that interleaves physics time with the
// arena and robot actors.

use crate::debug_sched;
use crate::scheduler::{Actor, Scheduler};
use crate::world::World;
use log::info;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Shared context handed to every service: the world, the scheduler, and
/// where the configuration files live. Actors only ever hold this handle plus
/// their own actor record, never direct body references.
#[derive(Clone)]
pub struct SimHandle {
    pub world: Arc<Mutex<World>>,
    pub scheduler: Arc<Scheduler>,
    pub config_dir: PathBuf,
}

impl SimHandle {
    pub fn new(world: World, config_dir: PathBuf) -> SimHandle {
        SimHandle {
            world: Arc::new(Mutex::new(world)),
            scheduler: Arc::new(Scheduler::new()),
            config_dir,
        }
    }

    pub fn lock_world(&self) -> std::sync::MutexGuard<'_, World> {
        self.world.lock().expect("world poisoned")
    }
}

/// Runs the main loop to completion, then walks the arena actor through its
/// post-simulation work and releases every actor for shutdown.
///
/// Each iteration resumes every actor whose wake-up time has been reached (in
/// registration order, each one running until it suspends again), applies the
/// motor forces, latches zone exits, steps the engine once and advances the
/// clock by one tick.
pub fn run(ctx: &SimHandle, arena_actor: &Actor) {
    debug_sched!("waiting for clients to be ready to begin");
    ctx.scheduler.wait_for_handover();
    info!("All clients ready, entering main loop");

    loop {
        let now = {
            let world = ctx.lock_world();
            if !world.is_running() {
                break;
            }
            world.now
        };

        for actor in ctx.scheduler.actors() {
            if actor.wake_up_time() <= now {
                ctx.scheduler.unblock(&actor);
            }
        }

        let mut world = ctx.lock_world();
        world.apply_motor_forces();
        world.check_zone_exits();
        world.step_tick();
    }

    info!("Simulation time is up");
    // The arena actor still has scores to calculate; it yields one last time
    // from terminate().
    ctx.scheduler.unblock(arena_actor);
    ctx.scheduler.begin_shutdown();
    debug_sched!("all actors released");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaService;
    use crate::config::{self, RobotSettings, TokenSpec};
    use crate::robot::RobotService;
    use crate::scheduler::ActorKind;
    use crate::world::TokenKind;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;
    use std::thread;

    fn test_handle(end_time: f64, tokens: &[TokenSpec]) -> SimHandle {
        SimHandle::new(World::new(end_time, tokens), PathBuf::from("."))
    }

    /// Builds a robot service in-proc, bypassing the RPC transport.
    fn add_robot(ctx: &SimHandle, team: usize, record: serde_json::Value) -> RobotService {
        let settings = RobotSettings::from_record(&record);
        ctx.lock_world().create_robot(team, &settings).unwrap();
        let actor = ctx.scheduler.register(ActorKind::Robot(team));
        RobotService::new(ctx.clone(), actor, team)
    }

    #[test]
    fn test_empty_simulation_runs_sixty_four_ticks() {
        let ctx = test_handle(1.0, &[]);
        let arena_actor = ctx.scheduler.register(ActorKind::Arena);
        let arena = ArenaService::new(ctx.clone(), arena_actor.clone());

        let controller = thread::spawn(move || {
            assert!(arena.wait_for_start());
            let mut drained = Vec::new();
            loop {
                let (running, messages) = arena.wait_for_output(0.25);
                drained.extend(messages);
                if !running {
                    break;
                }
            }
            let scores = arena.get_scores().unwrap();
            assert!(arena.terminate().unwrap());
            (scores, drained)
        });

        run(&ctx, &arena_actor);
        let (scores, drained) = controller.join().unwrap();
        assert_eq!(scores, [0, 0, 0, 0]);
        assert!(drained.is_empty());
        assert_approx_eq!(ctx.lock_world().now, 1.0);
    }

    #[test]
    fn test_sleeping_robot_scores_nothing() {
        let ctx = test_handle(2.0, &[]);
        let arena_actor = ctx.scheduler.register(ActorKind::Arena);
        let arena = ArenaService::new(ctx.clone(), arena_actor.clone());
        let robot = add_robot(&ctx, 0, json!({}));

        let program = thread::spawn(move || {
            assert!(robot.wait_for_start());
            // Sleeps past the end of the simulation; resumes exactly once,
            // after the main loop has exited.
            assert!(!robot.sleep(180.0).unwrap());
        });
        let controller = thread::spawn(move || {
            assert!(arena.wait_for_start());
            while arena.wait_for_output(0.5).0 {}
            let scores = arena.get_scores().unwrap();
            arena.terminate().unwrap();
            scores
        });

        run(&ctx, &arena_actor);
        program.join().unwrap();
        assert_eq!(controller.join().unwrap(), [0, 0, 0, 0]);
        assert!(!ctx.lock_world().robot_by_team(0).unwrap().has_left_zone);
    }

    #[test]
    fn test_driving_out_of_the_zone_scores_one_point() {
        let ctx = test_handle(2.0, &[]);
        let arena_actor = ctx.scheduler.register(ActorKind::Arena);
        let arena = ArenaService::new(ctx.clone(), arena_actor.clone());
        let robot = add_robot(&ctx, 0, json!({}));

        let program = thread::spawn(move || {
            assert!(robot.wait_for_start());
            robot.set_motor_power(1, 100.0).unwrap();
            robot.set_motor_power(2, 100.0).unwrap();
            assert!(!robot.sleep(10.0).unwrap());
        });
        let controller = thread::spawn(move || {
            assert!(arena.wait_for_start());
            while arena.wait_for_output(0.5).0 {}
            let scores = arena.get_scores().unwrap();
            arena.terminate().unwrap();
            scores
        });

        run(&ctx, &arena_actor);
        program.join().unwrap();
        assert_eq!(controller.join().unwrap(), [1, 0, 0, 0]);
        assert!(ctx.lock_world().robot_by_team(0).unwrap().has_left_zone);
    }

    #[test]
    fn test_sleep_resumes_on_the_next_tick_boundary() {
        let ctx = test_handle(1.0, &[]);
        let arena_actor = ctx.scheduler.register(ActorKind::Arena);
        let arena = ArenaService::new(ctx.clone(), arena_actor.clone());
        let robot = add_robot(&ctx, 0, json!({}));

        let ctx_for_program = ctx.clone();
        let program = thread::spawn(move || {
            assert!(robot.wait_for_start());
            assert!(robot.sleep(0.1).unwrap());
            // 0.1 s is not a tick multiple; the next boundary is 7/64 s.
            let resumed_at = ctx_for_program.lock_world().now;
            robot.sleep(180.0).ok();
            resumed_at
        });
        let controller = thread::spawn(move || {
            assert!(arena.wait_for_start());
            while arena.wait_for_output(0.5).0 {}
            arena.get_scores().unwrap();
            arena.terminate().unwrap();
        });

        run(&ctx, &arena_actor);
        controller.join().unwrap();
        let resumed_at = program.join().unwrap();
        assert_approx_eq!(resumed_at, 7.0 / 64.0);
        assert!(resumed_at >= 0.1);
        assert!(resumed_at - 0.1 < config::TICK_SECONDS);
    }

    #[test]
    fn test_print_output_reaches_the_controller() {
        let ctx = test_handle(1.0, &[]);
        let arena_actor = ctx.scheduler.register(ActorKind::Arena);
        let arena = ArenaService::new(ctx.clone(), arena_actor.clone());
        let robot = add_robot(&ctx, 3, json!({}));

        let program = thread::spawn(move || {
            assert!(robot.wait_for_start());
            robot.print("hello").unwrap();
            robot.sleep(180.0).ok();
        });
        let controller = thread::spawn(move || {
            assert!(arena.wait_for_start());
            let mut drained = Vec::new();
            loop {
                let (running, messages) = arena.wait_for_output(0.25);
                drained.extend(messages);
                if !running {
                    break;
                }
            }
            arena.get_scores().unwrap();
            arena.terminate().unwrap();
            drained
        });

        run(&ctx, &arena_actor);
        program.join().unwrap();
        let drained = controller.join().unwrap();
        assert_eq!(drained, vec!["Robot 3 at 0 printed: hello".to_string()]);
    }

    #[test]
    fn test_token_in_zone_scores_five_points() {
        // An ore token resting inside team 0's zone from the start.
        let specs = [TokenSpec {
            id: 32,
            kind: TokenKind::Ore,
            x: -2.75,
            y: 0.5,
        }];
        let ctx = test_handle(0.5, &specs);
        let arena_actor = ctx.scheduler.register(ActorKind::Arena);
        let arena = ArenaService::new(ctx.clone(), arena_actor.clone());

        let controller = thread::spawn(move || {
            assert!(arena.wait_for_start());
            while arena.wait_for_output(0.25).0 {}
            let scores = arena.get_scores().unwrap();
            arena.terminate().unwrap();
            scores
        });

        run(&ctx, &arena_actor);
        assert_eq!(controller.join().unwrap(), [5, 0, 0, 0]);
    }
}
