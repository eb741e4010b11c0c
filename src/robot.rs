// The per-robot service: the operations a robot program drives its simulated
// robot with.

use crate::config;
use crate::debug_sched;
use crate::error::SimError;
use crate::rpc::VisionFrame;
use crate::scheduler::Actor;
use crate::sim::SimHandle;
use crate::vision;
use crate::world::World;
use std::sync::Arc;

fn ensure_running(world: &World) -> Result<(), SimError> {
    if world.is_running() {
        Ok(())
    } else {
        Err(SimError::SimulationEnded)
    }
}

pub struct RobotService {
    ctx: SimHandle,
    actor: Arc<Actor>,
    team: usize,
}

impl RobotService {
    pub fn new(ctx: SimHandle, actor: Arc<Actor>, team: usize) -> RobotService {
        RobotService { ctx, actor, team }
    }

    pub fn team_number(&self) -> usize {
        self.team
    }

    /// Motor 1 is the left wheel, motor 2 the right.
    pub fn motor_power(&self, motor: u32) -> Result<f64, SimError> {
        let world = self.ctx.lock_world();
        ensure_running(&world)?;
        let robot = world
            .robot_by_team(self.team)
            .expect("robot service without a body");
        match motor {
            1 => Ok(robot.left_power),
            2 => Ok(robot.right_power),
            _ => Err(SimError::InvalidArgument(format!(
                "invalid motor number {motor}"
            ))),
        }
    }

    /// Latches a motor power, clamped into [-100, 100]. The new power feeds
    /// into the next force application of the main loop.
    pub fn set_motor_power(&self, motor: u32, power: f64) -> Result<f64, SimError> {
        let mut world = self.ctx.lock_world();
        ensure_running(&world)?;
        if !power.is_finite() {
            return Err(SimError::InvalidArgument(
                "attempted to set motor power to a non-numeric value".to_string(),
            ));
        }
        let clamped = power.clamp(-config::MOTOR_POWER_LIMIT, config::MOTOR_POWER_LIMIT);
        let robot = world
            .robot_by_team_mut(self.team)
            .expect("robot service without a body");
        match motor {
            1 => robot.left_power = clamped,
            2 => robot.right_power = clamped,
            _ => {
                return Err(SimError::InvalidArgument(format!(
                    "attempted to set power of invalid motor {motor}"
                )));
            }
        }
        Ok(clamped)
    }

    /// Queues a message for the controller's next output drain.
    pub fn print(&self, message: &str) -> Result<bool, SimError> {
        let mut world = self.ctx.lock_world();
        ensure_running(&world)?;
        world.queue_print(self.team, message);
        Ok(true)
    }

    /// Suspends until the simulated clock has advanced by `seconds`. Returns
    /// whether the simulation is still running on resumption.
    pub fn sleep(&self, seconds: f64) -> Result<bool, SimError> {
        debug_sched!("robot {} entering sleep({seconds})", self.team);
        ensure_running(&self.ctx.lock_world())?;
        self.actor.defer(seconds);
        self.ctx.scheduler.block(&self.actor);
        debug_sched!("robot {} exiting sleep", self.team);
        Ok(self.ctx.lock_world().is_running())
    }

    /// Takes a picture at the current frozen time, then suspends for a
    /// simulated exposure cost proportional to the image width.
    pub fn see(&self, resolution: (u32, u32)) -> Result<VisionFrame, SimError> {
        let frame = {
            let mut world = self.ctx.lock_world();
            ensure_running(&world)?;
            if !config::LEGAL_RESOLUTIONS.contains(&resolution) {
                return Err(SimError::InvalidArgument(format!(
                    "invalid resolution {}x{}; legal resolutions are {:?}",
                    resolution.0,
                    resolution.1,
                    config::LEGAL_RESOLUTIONS
                )));
            }
            vision::see(&mut world, self.team, resolution)
        };
        self.actor
            .defer(resolution.0 as f64 * config::SEE_SECONDS_PER_PIXEL);
        self.ctx.scheduler.block(&self.actor);
        Ok(frame)
    }

    /// Flags the robot as ready and parks until the competition begins.
    pub fn wait_for_start(&self) -> bool {
        debug_sched!("robot {} waiting for start", self.team);
        // Lower the gate before flagging ready: once the flag is up the main
        // loop may raise the gate at any moment.
        self.actor.gate.clear();
        self.actor.mark_ready();
        if self.ctx.scheduler.is_shutting_down() {
            return true;
        }
        self.actor.gate.wait();
        debug_sched!("robot {} now starting", self.team);
        true
    }
}
