// Cooperative single-lane scheduler. At any instant exactly one participant
// (the main loop or one actor) executes simulation logic; everyone else is
// parked on a gate. Physics time never advances while an actor runs.

use crate::debug_sched;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// A manually raised/lowered event that threads can wait on.
pub struct Gate {
    raised: Mutex<bool>,
    condvar: Condvar,
}

impl Gate {
    pub fn new(raised: bool) -> Gate {
        Gate {
            raised: Mutex::new(raised),
            condvar: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut raised = self.raised.lock().expect("gate poisoned");
        *raised = true;
        self.condvar.notify_all();
    }

    pub fn clear(&self) {
        *self.raised.lock().expect("gate poisoned") = false;
    }

    /// Blocks until the gate is raised. Returns immediately if it already is.
    pub fn wait(&self) {
        let mut raised = self.raised.lock().expect("gate poisoned");
        while !*raised {
            raised = self.condvar.wait(raised).expect("gate poisoned");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Arena,
    Robot(usize),
}

impl ActorKind {
    fn label(&self) -> String {
        match self {
            ActorKind::Arena => "arena".to_string(),
            ActorKind::Robot(team) => format!("robot {team}"),
        }
    }
}

/// Scheduling record for one logical coroutine.
pub struct Actor {
    pub kind: ActorKind,
    pub gate: Gate,
    wake_up_time: Mutex<f64>,
    ready_to_start: AtomicBool,
    suspended: AtomicBool,
}

impl Actor {
    fn new(kind: ActorKind) -> Actor {
        Actor {
            kind,
            gate: Gate::new(false),
            wake_up_time: Mutex::new(0.0),
            ready_to_start: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
        }
    }

    /// Earliest simulated time at which the actor is eligible to resume.
    pub fn wake_up_time(&self) -> f64 {
        *self.wake_up_time.lock().expect("actor poisoned")
    }

    /// Pushes the wake-up time `seconds` further into the simulated future.
    pub fn defer(&self, seconds: f64) {
        *self.wake_up_time.lock().expect("actor poisoned") += seconds;
    }

    pub fn mark_ready(&self) {
        self.ready_to_start.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready_to_start.load(Ordering::SeqCst)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

/// Owns the main gate and the actor registry. Actors resume in registration
/// order: the arena first, then robots in creation order.
pub struct Scheduler {
    main_gate: Gate,
    actors: Mutex<Vec<Arc<Actor>>>,
    shutting_down: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            main_gate: Gate::new(false),
            actors: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn register(&self, kind: ActorKind) -> Arc<Actor> {
        let actor = Arc::new(Actor::new(kind));
        self.actors
            .lock()
            .expect("scheduler poisoned")
            .push(actor.clone());
        actor
    }

    /// Snapshot of the registry in registration order.
    pub fn actors(&self) -> Vec<Arc<Actor>> {
        self.actors.lock().expect("scheduler poisoned").clone()
    }

    pub fn all_ready(&self) -> bool {
        self.actors
            .lock()
            .expect("scheduler poisoned")
            .iter()
            .all(|actor| actor.is_ready())
    }

    /// Suspends the calling actor and hands the simulation token to the main
    /// loop. Returns once the main loop hands it back.
    pub fn block(&self, actor: &Actor) {
        actor.gate.clear();
        actor.suspended.store(true, Ordering::SeqCst);
        debug_sched!("{} yields control to main", actor.kind.label());
        self.main_gate.set();
        actor.gate.wait();
        actor.suspended.store(false, Ordering::SeqCst);
        debug_sched!("{} receives control from main", actor.kind.label());
    }

    /// Hands the simulation token to an actor and waits for it back. Must
    /// only be called from the main loop.
    pub fn unblock(&self, actor: &Actor) {
        self.main_gate.clear();
        actor.gate.set();
        self.main_gate.wait();
    }

    /// Parks the calling actor on its own gate without waking main. Used by
    /// the pre-start handshake.
    pub fn park_until_released(&self, actor: &Actor) {
        actor.gate.clear();
        actor.gate.wait();
    }

    /// Blocks the main thread until the first actor yields to it.
    pub fn wait_for_handover(&self) {
        self.main_gate.wait();
    }

    /// Releases every parked actor so it can observe that the simulation has
    /// ended and let its client disconnect.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        for actor in self.actors() {
            debug_sched!("releasing {} to shut down", actor.kind.label());
            actor.gate.set();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_gate_set_before_wait_does_not_block() {
        let gate = Gate::new(true);
        gate.wait();
        gate.clear();
        gate.set();
        gate.wait();
    }

    #[test]
    fn test_gate_releases_waiting_thread() {
        let gate = Arc::new(Gate::new(false));
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.wait())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        gate.set();
        waiter.join().unwrap();
    }

    #[test]
    fn test_block_unblock_handshake() {
        let scheduler = Arc::new(Scheduler::new());
        let actor = scheduler.register(ActorKind::Robot(0));

        let worker = {
            let scheduler = scheduler.clone();
            let actor = actor.clone();
            thread::spawn(move || {
                actor.defer(1.5);
                scheduler.block(&actor);
                42
            })
        };

        // The actor raises the main gate when it suspends.
        scheduler.wait_for_handover();
        assert!(actor.is_suspended());
        assert_eq!(actor.wake_up_time(), 1.5);

        // Release the actor the way the shutdown path does; it never yields
        // again, so a full unblock() would wait forever.
        actor.gate.set();
        assert_eq!(worker.join().unwrap(), 42);
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let scheduler = Scheduler::new();
        scheduler.register(ActorKind::Arena);
        scheduler.register(ActorKind::Robot(2));
        scheduler.register(ActorKind::Robot(0));
        let kinds: Vec<ActorKind> = scheduler.actors().iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ActorKind::Arena, ActorKind::Robot(2), ActorKind::Robot(0)]
        );
    }

    #[test]
    fn test_readiness_tracks_every_actor() {
        let scheduler = Scheduler::new();
        let arena = scheduler.register(ActorKind::Arena);
        let robot = scheduler.register(ActorKind::Robot(0));
        assert!(!scheduler.all_ready());
        arena.mark_ready();
        assert!(!scheduler.all_ready());
        robot.mark_ready();
        assert!(scheduler.all_ready());
    }

    #[test]
    fn test_shutdown_releases_parked_actors() {
        let scheduler = Arc::new(Scheduler::new());
        let actor = scheduler.register(ActorKind::Robot(1));
        let parked = {
            let scheduler = scheduler.clone();
            let actor = actor.clone();
            thread::spawn(move || scheduler.park_until_released(&actor))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!parked.is_finished());
        scheduler.begin_shutdown();
        parked.join().unwrap();
        assert!(scheduler.is_shutting_down());
    }
}
