use crate::command::{Command, CommandKind, Reply, WorldObject};
use crate::generate::{self, SurfaceSampler};
use crate::lifecycle::{Lifecycle, LifecycleGate};
use crate::resolver::{self, ResolverScratch};
use crate::ticket::Ticket;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use thingspace_common::ThingKey;
use thingspace_kernel::{RenderFactory, ThingStore};
use thingspace_persist::ThingDb;
use thingspace_render::SceneRoot;

/// Errors from core lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("core is already initialized")]
    AlreadyInitialized,
    #[error("core is stopped")]
    Stopped,
    #[error("worker thread spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
    #[error(transparent)]
    Db(#[from] thingspace_persist::DbError),
}

/// Tuning knobs for the core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Every Nth surviving spawn point becomes a tree.
    pub tree_threshold: u32,
    /// Candidate spawn points at or below this height are discarded.
    pub min_spawn_height: f32,
    /// Upper bound on how long a parked worker waits in a dequeue before
    /// re-checking the lifecycle.
    pub queue_poll: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tree_threshold: 40,
            min_spawn_height: -30.0,
            queue_poll: Duration::from_millis(50),
        }
    }
}

/// The downstream queue a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lane {
    Mutation,
    Query,
    Generation,
}

/// Total, deterministic routing: every command kind maps to exactly one
/// lane, independent of argument values.
pub(crate) fn route(kind: &CommandKind) -> Lane {
    match kind {
        CommandKind::AddThing { .. }
        | CommandKind::AddThings { .. }
        | CommandKind::DeleteThing { .. }
        | CommandKind::DeleteThings { .. } => Lane::Mutation,
        CommandKind::ListToRender { .. } => Lane::Query,
        CommandKind::GenerateEnvironment { .. } => Lane::Generation,
    }
}

/// The single coordination point for the world of things.
///
/// Owns the lifecycle, the entity store, the world container, and the four
/// cooperating loops: the ingress dispatcher plus the mutation, query, and
/// generation workers. `submit` is the sole runtime entry point for work.
pub struct Nexus {
    config: CoreConfig,
    gate: Arc<LifecycleGate>,
    store: Arc<ThingStore>,
    scene: Arc<Mutex<SceneRoot>>,
    factory: Arc<dyn RenderFactory>,
    sampler: Arc<dyn SurfaceSampler>,
    next_id: Arc<AtomicU64>,
    db_path: Option<PathBuf>,
    db: Option<ThingDb>,
    ingress: Option<Sender<Command>>,
    workers: Vec<JoinHandle<()>>,
}

impl Nexus {
    pub fn new(
        config: CoreConfig,
        factory: Arc<dyn RenderFactory>,
        sampler: Arc<dyn SurfaceSampler>,
    ) -> Self {
        Self {
            config,
            gate: Arc::new(LifecycleGate::new()),
            store: Arc::new(ThingStore::new()),
            scene: Arc::new(Mutex::new(SceneRoot::new())),
            factory,
            sampler,
            next_id: Arc::new(AtomicU64::new(1)),
            db_path: None,
            db: None,
            ingress: None,
            workers: Vec::new(),
        }
    }

    /// Persist the store to a thing db at this path across lifecycles.
    pub fn with_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    pub fn state(&self) -> Lifecycle {
        self.gate.state()
    }

    /// Shared handle to the authoritative store.
    pub fn store(&self) -> Arc<ThingStore> {
        Arc::clone(&self.store)
    }

    /// Shared handle to the world container.
    pub fn scene(&self) -> Arc<Mutex<SceneRoot>> {
        Arc::clone(&self.scene)
    }

    /// Bring the core up: open and load the db, start all loops, and land
    /// in `Running`.
    pub fn initialize(&mut self) -> Result<(), CoreError> {
        match self.gate.state() {
            Lifecycle::NotInitialized => {}
            Lifecycle::Stopped => return Err(CoreError::Stopped),
            _ => return Err(CoreError::AlreadyInitialized),
        }
        self.gate.set(Lifecycle::Suspended);

        if let Some(path) = &self.db_path {
            let db = ThingDb::open(path)?;
            if db.generation_count() > 0 {
                let things = db.load_latest()?;
                // id allocation resumes past everything persisted
                let max_id = things.keys().map(|id| id.0).max().unwrap_or(0);
                self.next_id.store(max_id + 1, Ordering::Relaxed);
                tracing::info!(things = things.len(), "restored thing store from db");
                self.store.load(things);
            }
            self.db = Some(db);
        }

        let (ingress_tx, ingress_rx) = crossbeam_channel::unbounded::<Command>();
        let (mutation_tx, mutation_rx) = crossbeam_channel::unbounded::<Command>();
        let (query_tx, query_rx) = crossbeam_channel::unbounded::<Command>();
        let (generation_tx, generation_rx) = crossbeam_channel::unbounded::<Command>();
        let poll = self.config.queue_poll;

        {
            let gate = Arc::clone(&self.gate);
            self.workers.push(
                std::thread::Builder::new()
                    .name("command-operator".into())
                    .spawn(move || {
                        dispatcher_loop(gate, ingress_rx, mutation_tx, query_tx, generation_tx, poll)
                    })?,
            );
        }
        {
            let gate = Arc::clone(&self.gate);
            let store = Arc::clone(&self.store);
            let scene = Arc::clone(&self.scene);
            let factory = Arc::clone(&self.factory);
            self.workers.push(
                std::thread::Builder::new()
                    .name("thing-update".into())
                    .spawn(move || mutation_loop(gate, mutation_rx, poll, store, scene, factory))?,
            );
        }
        {
            let gate = Arc::clone(&self.gate);
            let store = Arc::clone(&self.store);
            let factory = Arc::clone(&self.factory);
            self.workers.push(
                std::thread::Builder::new()
                    .name("render-handler".into())
                    .spawn(move || query_loop(gate, query_rx, poll, store, factory))?,
            );
        }
        {
            let gate = Arc::clone(&self.gate);
            let sampler = Arc::clone(&self.sampler);
            let next_id = Arc::clone(&self.next_id);
            let resubmit = ingress_tx.clone();
            let config = self.config.clone();
            self.workers.push(
                std::thread::Builder::new()
                    .name("generator".into())
                    .spawn(move || {
                        generator_loop(gate, generation_rx, poll, sampler, next_id, resubmit, config)
                    })?,
            );
        }

        self.ingress = Some(ingress_tx);
        self.gate.set(Lifecycle::Running);
        tracing::info!("thingspace core running");
        Ok(())
    }

    /// Submit a command. Returns its ticket immediately; completion is
    /// asynchronous. After shutdown the ticket comes back already failed.
    pub fn submit(&self, kind: CommandKind) -> Ticket {
        let ticket = Ticket::new();
        if self.gate.state() == Lifecycle::Stopped {
            ticket.fail("core is stopped");
            return ticket;
        }
        let Some(ingress) = &self.ingress else {
            ticket.fail("core is not initialized");
            return ticket;
        };
        let command = Command {
            kind,
            ticket: ticket.clone(),
        };
        if let Err(err) = ingress.send(command) {
            err.into_inner().ticket.fail("ingress queue closed");
        }
        ticket
    }

    /// Pause all loops. Queued commands accumulate until `resume`.
    pub fn suspend(&self) {
        if self.gate.state() == Lifecycle::Running {
            self.gate.set(Lifecycle::Suspended);
        } else {
            tracing::warn!(state = ?self.gate.state(), "suspend ignored");
        }
    }

    pub fn resume(&self) {
        if self.ingress.is_some() && self.gate.state() == Lifecycle::Suspended {
            self.gate.set(Lifecycle::Running);
        } else {
            tracing::warn!(state = ?self.gate.state(), "resume ignored");
        }
    }

    /// Stop all loops, join them, flush the store to the db, and release it.
    /// Terminal: no command is processed afterwards.
    pub fn shutdown(&mut self) -> Result<(), CoreError> {
        if self.gate.state() == Lifecycle::Stopped && self.workers.is_empty() {
            return Ok(());
        }
        self.gate.set(Lifecycle::Stopped);
        self.ingress = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked before shutdown");
            }
        }
        if let Some(db) = self.db.as_mut() {
            db.save(&self.store.snapshot())?;
        }
        self.db = None;
        tracing::info!("thingspace core stopped");
        Ok(())
    }
}

impl Drop for Nexus {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(%err, "shutdown during drop failed");
        }
    }
}

fn lock_scene(scene: &Mutex<SceneRoot>) -> MutexGuard<'_, SceneRoot> {
    scene.lock().unwrap_or_else(|e| e.into_inner())
}

/// Common loop shape for all five loops: park while not running, dequeue
/// with a bounded wait, re-check the lifecycle for anything dequeued while
/// parked, then process. Commands still queued when the loop exits are
/// failed rather than abandoned, so every ticket reaches a terminal status.
fn worker_loop(
    gate: Arc<LifecycleGate>,
    rx: Receiver<Command>,
    poll: Duration,
    mut handle: impl FnMut(Command),
) {
    loop {
        if gate.block_until_active() == Lifecycle::Stopped {
            break;
        }
        let command = match rx.recv_timeout(poll) {
            Ok(command) => command,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        // a suspend may have landed while this worker was blocked in the
        // dequeue; hold the command until running again
        if gate.block_until_active() == Lifecycle::Stopped {
            command.ticket.fail("core stopped");
            break;
        }
        let ticket = command.ticket.clone();
        let name = command.kind.name();
        if std::panic::catch_unwind(AssertUnwindSafe(|| handle(command))).is_err() {
            tracing::error!(command = name, "worker panicked while processing command");
            ticket.fail("internal error while processing command");
        }
    }
    while let Ok(command) = rx.try_recv() {
        command.ticket.fail("core stopped");
    }
}

/// Ingress loop: drains the ingress queue one command at a time and forwards
/// each to exactly one downstream queue, preserving FIFO order per lane.
fn dispatcher_loop(
    gate: Arc<LifecycleGate>,
    ingress_rx: Receiver<Command>,
    mutation_tx: Sender<Command>,
    query_tx: Sender<Command>,
    generation_tx: Sender<Command>,
    poll: Duration,
) {
    worker_loop(gate, ingress_rx, poll, move |command| {
        let lane = route(&command.kind);
        tracing::trace!(command = command.kind.name(), ?lane, "dispatch");
        let tx = match lane {
            Lane::Mutation => &mutation_tx,
            Lane::Query => &query_tx,
            Lane::Generation => &generation_tx,
        };
        if let Err(err) = tx.send(command) {
            err.into_inner().ticket.fail("downstream queue closed");
        }
    });
}

/// Mutation worker: the store's single writer.
fn mutation_loop(
    gate: Arc<LifecycleGate>,
    rx: Receiver<Command>,
    poll: Duration,
    store: Arc<ThingStore>,
    scene: Arc<Mutex<SceneRoot>>,
    factory: Arc<dyn RenderFactory>,
) {
    worker_loop(gate, rx, poll, move |command| {
        let Command { kind, ticket } = command;
        match kind {
            CommandKind::AddThing { object } => {
                let object = add_object(&store, &scene, factory.as_ref(), object);
                ticket.complete("successfully added", Reply::Object(object));
            }
            CommandKind::AddThings { objects } => {
                let count = objects.len();
                for object in objects {
                    add_object(&store, &scene, factory.as_ref(), object);
                }
                ticket.complete(format!("successfully added {count} objects"), Reply::None);
            }
            CommandKind::DeleteThing { key } => {
                match delete_key(&store, &scene, factory.as_ref(), key) {
                    Ok(()) => {
                        ticket.complete("deleted", Reply::None);
                    }
                    Err(cause) => {
                        tracing::warn!(%cause, "delete failed");
                        ticket.fail(cause);
                    }
                }
            }
            CommandKind::DeleteThings { keys } => {
                let total = keys.len();
                let mut failures = Vec::new();
                for key in keys {
                    if let Err(cause) = delete_key(&store, &scene, factory.as_ref(), key) {
                        tracing::warn!(%cause, "delete failed, continuing batch");
                        failures.push(cause);
                    }
                }
                if failures.is_empty() {
                    ticket.complete(format!("deleted {total} objects"), Reply::None);
                } else {
                    ticket.fail(format!(
                        "{} of {total} deletions failed: {}",
                        failures.len(),
                        failures.join("; ")
                    ));
                }
            }
            other => {
                ticket.fail(format!(
                    "unsupported command {} for the mutation worker",
                    other.name()
                ));
            }
        }
    });
}

/// Insert a thing (recreating it first if compressed) and attach its
/// representation to the world container. Bare spatials attach directly and
/// never enter the store. Returns the object as stored, so reply payloads
/// echo the recreated and rendered form rather than what the caller sent.
fn add_object(
    store: &ThingStore,
    scene: &Mutex<SceneRoot>,
    factory: &dyn RenderFactory,
    object: WorldObject,
) -> WorldObject {
    match object {
        WorldObject::Thing(mut thing) => {
            if thing.is_compressed() {
                thing.recreate();
            }
            if thing.is_stale() {
                thing.render(factory);
            }
            let spatial = thing.rendered().cloned();
            tracing::debug!(id = %thing.id(), "adding thing");
            let echo = thing.clone();
            store.insert(*thing);
            if let Some(spatial) = spatial {
                lock_scene(scene).attach(spatial);
            }
            WorldObject::Thing(echo)
        }
        WorldObject::Bare(spatial) => {
            tracing::debug!(name = spatial.name(), "adding bare spatial");
            lock_scene(scene).attach(spatial.clone());
            WorldObject::Bare(spatial)
        }
    }
}

fn delete_key(
    store: &ThingStore,
    scene: &Mutex<SceneRoot>,
    factory: &dyn RenderFactory,
    key: ThingKey,
) -> Result<(), String> {
    match key {
        ThingKey::Id(id) => match store.remove(id) {
            Some(mut thing) => {
                if let Some(spatial) = thing.take_rendered() {
                    lock_scene(scene).detach(&spatial);
                    factory.destroy(spatial);
                }
                Ok(())
            }
            None => Err(format!("no thing with id {id}")),
        },
        ThingKey::Name(name) => match lock_scene(scene).detach_by_name(&name) {
            Some(spatial) => {
                factory.destroy(spatial);
                Ok(())
            }
            None => Err(format!("no bare spatial named {name:?}")),
        },
    }
}

/// Query worker: runs visibility passes. Side-effect-free with respect to
/// the world container — callers apply the returned diff.
fn query_loop(
    gate: Arc<LifecycleGate>,
    rx: Receiver<Command>,
    poll: Duration,
    store: Arc<ThingStore>,
    factory: Arc<dyn RenderFactory>,
) {
    let mut scratch = ResolverScratch::default();
    worker_loop(gate, rx, poll, move |command| {
        let Command { kind, ticket } = command;
        match kind {
            CommandKind::ListToRender {
                eye,
                render_distance,
                far_distance,
                previous_spatials,
                previous_sprites,
            } => {
                let diff = resolver::resolve(
                    &store,
                    factory.as_ref(),
                    &mut scratch,
                    eye,
                    render_distance,
                    far_distance,
                    &previous_spatials,
                    &previous_sprites,
                );
                ticket.complete("", Reply::RenderSets(diff));
            }
            other => {
                ticket.fail(format!(
                    "unsupported command {} for the render handler",
                    other.name()
                ));
            }
        }
    });
}

/// Generation worker: samples spawn points and feeds new things back into
/// the pipeline through the ingress queue.
fn generator_loop(
    gate: Arc<LifecycleGate>,
    rx: Receiver<Command>,
    poll: Duration,
    sampler: Arc<dyn SurfaceSampler>,
    next_id: Arc<AtomicU64>,
    resubmit: Sender<Command>,
    config: CoreConfig,
) {
    worker_loop(gate, rx, poll, move |command| {
        let Command { kind, ticket } = command;
        match kind {
            CommandKind::GenerateEnvironment { options } => {
                generate::generate(
                    &options,
                    sampler.as_ref(),
                    &next_id,
                    config.tree_threshold,
                    config.min_spawn_height,
                    |kind| {
                        let sub_ticket = Ticket::new();
                        let sub = Command {
                            kind,
                            ticket: sub_ticket.clone(),
                        };
                        if let Err(err) = resubmit.send(sub) {
                            err.into_inner().ticket.fail("ingress queue closed");
                        }
                        sub_ticket
                    },
                );
                ticket.complete("", Reply::None);
            }
            other => {
                ticket.fail(format!(
                    "unsupported command {} for the generator",
                    other.name()
                ));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::GenerateOptions;
    use crate::generate::{FlatGridSampler, GRASS_CLASS, TREE_CLASS};
    use crate::ticket::Status;
    use glam::Vec3;
    use std::collections::HashSet;
    use std::time::Instant;
    use thingspace_common::{ClassId, Spatial, ThingId};
    use thingspace_kernel::Thing;
    use thingspace_render::NullRenderFactory;

    const WAIT: Duration = Duration::from_secs(5);

    fn make_nexus() -> Nexus {
        let config = CoreConfig {
            queue_poll: Duration::from_millis(5),
            ..CoreConfig::default()
        };
        Nexus::new(
            config,
            Arc::new(NullRenderFactory::new()),
            Arc::new(FlatGridSampler { ground_y: 0.0 }),
        )
    }

    fn running_nexus() -> Nexus {
        let mut nexus = make_nexus();
        nexus.initialize().unwrap();
        nexus
    }

    fn make_thing(id: u64) -> Thing {
        let mut t = Thing::new(ThingId(id), ClassId(1), 1);
        t.initialize();
        t.set_location(Vec3::new(id as f32, 0.0, 0.0));
        t
    }

    fn add(nexus: &Nexus, thing: Thing) -> Ticket {
        nexus.submit(CommandKind::AddThing {
            object: WorldObject::Thing(Box::new(thing)),
        })
    }

    fn wait_for_store_len(nexus: &Nexus, len: usize) {
        let deadline = Instant::now() + WAIT;
        while nexus.store().len() != len {
            assert!(Instant::now() < deadline, "store never reached {len} things");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn routing_is_total_and_deterministic() {
        let kinds = [
            (
                CommandKind::AddThing {
                    object: WorldObject::Bare(Spatial::new("a")),
                },
                Lane::Mutation,
            ),
            (CommandKind::AddThings { objects: vec![] }, Lane::Mutation),
            (
                CommandKind::DeleteThing {
                    key: ThingKey::Id(ThingId(1)),
                },
                Lane::Mutation,
            ),
            (CommandKind::DeleteThings { keys: vec![] }, Lane::Mutation),
            (
                CommandKind::ListToRender {
                    eye: Vec3::ZERO,
                    render_distance: 1.0,
                    far_distance: 2.0,
                    previous_spatials: HashSet::new(),
                    previous_sprites: HashSet::new(),
                },
                Lane::Query,
            ),
            (
                CommandKind::GenerateEnvironment {
                    options: GenerateOptions {
                        width: 1,
                        height: 1,
                        density: 1.0,
                        surface: "terrain".into(),
                    },
                },
                Lane::Generation,
            ),
        ];
        for (kind, lane) in &kinds {
            assert_eq!(route(kind), *lane);
            assert_eq!(route(kind), *lane); // deterministic
        }
    }

    #[test]
    fn add_thing_roundtrip() {
        let mut nexus = running_nexus();
        let thing = make_thing(1);
        let state = thing.state();

        let outcome = add(&nexus, thing).wait_timeout(WAIT).unwrap();
        assert_eq!(outcome.status, Status::Completed);
        let Reply::Object(WorldObject::Thing(echo)) = outcome.reply else {
            panic!("expected the added thing as payload");
        };
        assert_eq!(echo.id(), ThingId(1));
        // the payload echoes the stored form, rendered and up to date
        assert!(echo.rendered().is_some());
        assert_eq!(echo.render_state(), state);

        let stored = nexus.store().get(ThingId(1)).unwrap();
        assert_eq!(stored.id(), ThingId(1));
        assert_eq!(stored.class_id(), ClassId(1));
        assert_eq!(stored.location(), Vec3::new(1.0, 0.0, 0.0));
        // the add rendered it and attached the representation
        assert_eq!(stored.render_state(), state);
        let spatial = stored.rendered().cloned().unwrap();
        assert!(lock_scene(&nexus.scene()).contains(&spatial));

        nexus.shutdown().unwrap();
    }

    #[test]
    fn compressed_thing_is_recreated_on_add() {
        let mut nexus = running_nexus();
        let mut thing = make_thing(1);
        thing.compress();
        assert!(thing.is_compressed());

        let outcome = add(&nexus, thing).wait_timeout(WAIT).unwrap();
        let Reply::Object(WorldObject::Thing(echo)) = outcome.reply else {
            panic!("expected the added thing as payload");
        };
        // the echo reflects the recreation, not the compressed input
        assert!(!echo.is_compressed());
        assert!(echo.is_initialized());
        assert!(echo.rendered().is_some());

        let stored = nexus.store().get(ThingId(1)).unwrap();
        assert!(!stored.is_compressed());
        assert!(stored.is_initialized());
        assert!(stored.rendered().is_some());

        nexus.shutdown().unwrap();
    }

    #[test]
    fn bare_spatial_skips_the_store() {
        let mut nexus = running_nexus();
        let spatial = Spatial::new("fence");
        let outcome = nexus
            .submit(CommandKind::AddThing {
                object: WorldObject::Bare(spatial.clone()),
            })
            .wait_timeout(WAIT)
            .unwrap();
        assert_eq!(outcome.status, Status::Completed);
        assert!(nexus.store().is_empty());
        assert!(lock_scene(&nexus.scene()).contains(&spatial));

        // bare spatials are deleted by name
        let outcome = nexus
            .submit(CommandKind::DeleteThing {
                key: ThingKey::Name("fence".into()),
            })
            .wait_timeout(WAIT)
            .unwrap();
        assert_eq!(outcome.status, Status::Completed);
        assert!(lock_scene(&nexus.scene()).is_empty());

        nexus.shutdown().unwrap();
    }

    #[test]
    fn delete_missing_thing_fails_terminally() {
        let mut nexus = running_nexus();
        let outcome = nexus
            .submit(CommandKind::DeleteThing {
                key: ThingKey::Id(ThingId(404)),
            })
            .wait_timeout(WAIT)
            .unwrap();
        assert_eq!(outcome.status, Status::Failed);
        assert!(outcome.message.contains("404"));
        nexus.shutdown().unwrap();
    }

    #[test]
    fn batch_delete_reports_partial_failure() {
        let mut nexus = running_nexus();
        add(&nexus, make_thing(1)).wait_timeout(WAIT).unwrap();
        add(&nexus, make_thing(2)).wait_timeout(WAIT).unwrap();

        let outcome = nexus
            .submit(CommandKind::DeleteThings {
                keys: vec![
                    ThingKey::Id(ThingId(1)),
                    ThingKey::Id(ThingId(99)),
                    ThingKey::Id(ThingId(2)),
                ],
            })
            .wait_timeout(WAIT)
            .unwrap();
        // the batch continued past the missing id, but the failure is reported
        assert_eq!(outcome.status, Status::Failed);
        assert!(outcome.message.contains("1 of 3"));
        assert!(nexus.store().is_empty());

        nexus.shutdown().unwrap();
    }

    #[test]
    fn visibility_query_end_to_end() {
        let mut nexus = running_nexus();
        add(&nexus, make_thing(1)).wait_timeout(WAIT).unwrap();
        add(&nexus, make_thing(2)).wait_timeout(WAIT).unwrap();

        let query = |previous: &HashSet<Spatial>| {
            nexus.submit(CommandKind::ListToRender {
                eye: Vec3::ZERO,
                render_distance: 100.0,
                far_distance: 400.0,
                previous_spatials: previous.clone(),
                previous_sprites: HashSet::new(),
            })
        };

        let outcome = query(&HashSet::new()).wait_timeout(WAIT).unwrap();
        assert_eq!(outcome.status, Status::Completed);
        let Reply::RenderSets(first) = outcome.reply else {
            panic!("expected render sets");
        };
        assert_eq!(first.attach_spatials.len(), 2);
        assert!(first.detach_spatials.is_empty());

        // unchanged world: feeding the first result back yields no diff
        let outcome = query(&first.attach_spatials).wait_timeout(WAIT).unwrap();
        let Reply::RenderSets(second) = outcome.reply else {
            panic!("expected render sets");
        };
        assert!(second.is_empty());

        nexus.shutdown().unwrap();
    }

    #[test]
    fn generation_populates_the_store() {
        struct FixedSampler;
        impl SurfaceSampler for FixedSampler {
            fn cast(&self, _options: &GenerateOptions) -> Vec<Vec3> {
                (0..10).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect()
            }
        }

        let config = CoreConfig {
            tree_threshold: 3,
            queue_poll: Duration::from_millis(5),
            ..CoreConfig::default()
        };
        let mut nexus = Nexus::new(
            config,
            Arc::new(NullRenderFactory::new()),
            Arc::new(FixedSampler),
        );
        nexus.initialize().unwrap();

        let outcome = nexus
            .submit(CommandKind::GenerateEnvironment {
                options: GenerateOptions {
                    width: 10,
                    height: 1,
                    density: 1.0,
                    surface: "terrain".into(),
                },
            })
            .wait_timeout(WAIT)
            .unwrap();
        assert_eq!(outcome.status, Status::Completed);

        // the spawned AddThing commands are fire-and-forget; wait for them
        wait_for_store_len(&nexus, 10);

        let snapshot = nexus.store().snapshot();
        let trees = snapshot
            .values()
            .filter(|t| t.class_id() == TREE_CLASS)
            .count();
        let grass = snapshot
            .values()
            .filter(|t| t.class_id() == GRASS_CLASS)
            .count();
        assert_eq!(trees, 3); // floor(10 / 3)
        assert_eq!(grass, 7);

        let mut ids: Vec<u64> = snapshot.keys().map(|id| id.0).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=10).collect::<Vec<u64>>());

        nexus.shutdown().unwrap();
    }

    #[test]
    fn suspended_commands_queue_until_resume() {
        let mut nexus = running_nexus();
        nexus.suspend();
        assert_eq!(nexus.state(), Lifecycle::Suspended);

        let ticket = add(&nexus, make_thing(1));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(ticket.status(), Status::Pending);
        assert!(nexus.store().is_empty());

        nexus.resume();
        let outcome = ticket.wait_timeout(WAIT).unwrap();
        assert_eq!(outcome.status, Status::Completed);
        assert_eq!(nexus.store().len(), 1);

        nexus.shutdown().unwrap();
    }

    #[test]
    fn nothing_processes_after_shutdown() {
        let mut nexus = running_nexus();
        nexus.shutdown().unwrap();
        assert_eq!(nexus.state(), Lifecycle::Stopped);

        let ticket = add(&nexus, make_thing(1));
        let outcome = ticket.wait_timeout(WAIT).unwrap();
        assert_eq!(outcome.status, Status::Failed);
        assert!(nexus.store().is_empty());
    }

    #[test]
    fn commands_in_flight_at_shutdown_reach_terminal_status() {
        let mut nexus = running_nexus();
        nexus.suspend();
        let tickets: Vec<Ticket> = (1..=5).map(|i| add(&nexus, make_thing(i))).collect();
        nexus.shutdown().unwrap();

        for ticket in tickets {
            let outcome = ticket.wait_timeout(WAIT).unwrap();
            assert_eq!(outcome.status, Status::Failed);
        }
    }

    #[test]
    fn submit_before_initialize_fails() {
        let nexus = make_nexus();
        let ticket = add(&nexus, make_thing(1));
        assert_eq!(ticket.status(), Status::Failed);
    }

    #[test]
    fn initialize_twice_is_an_error() {
        let mut nexus = running_nexus();
        assert!(matches!(
            nexus.initialize(),
            Err(CoreError::AlreadyInitialized)
        ));
        nexus.shutdown().unwrap();
        assert!(matches!(nexus.initialize(), Err(CoreError::Stopped)));
    }

    #[test]
    fn concurrent_adds_and_queries_do_not_corrupt_the_store() {
        let mut nexus = running_nexus();
        let nexus_ref = &nexus;

        std::thread::scope(|scope| {
            let adder = scope.spawn(move || {
                (1..=50)
                    .map(|i| add(nexus_ref, make_thing(i)))
                    .collect::<Vec<Ticket>>()
            });
            let querier = scope.spawn(move || {
                for _ in 0..20 {
                    let ticket = nexus_ref.submit(CommandKind::ListToRender {
                        eye: Vec3::ZERO,
                        render_distance: 100.0,
                        far_distance: 400.0,
                        previous_spatials: HashSet::new(),
                        previous_sprites: HashSet::new(),
                    });
                    ticket.wait_timeout(WAIT).unwrap();
                }
            });

            for ticket in adder.join().unwrap() {
                let outcome = ticket.wait_timeout(WAIT).unwrap();
                assert_eq!(outcome.status, Status::Completed);
            }
            querier.join().unwrap();
        });

        assert_eq!(nexus.store().len(), 50);
        let mut ids: Vec<u64> = nexus.store().ids().iter().map(|id| id.0).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 50);

        nexus.shutdown().unwrap();
    }

    #[test]
    fn store_persists_across_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("things");

        {
            let mut nexus = make_nexus().with_db(&path);
            nexus.initialize().unwrap();
            add(&nexus, make_thing(1)).wait_timeout(WAIT).unwrap();
            add(&nexus, make_thing(2)).wait_timeout(WAIT).unwrap();
            nexus.shutdown().unwrap();
        }

        let mut nexus = make_nexus().with_db(&path);
        nexus.initialize().unwrap();
        assert_eq!(nexus.store().len(), 2);
        assert!(nexus.store().contains(ThingId(1)));
        // id allocation continues past the restored things
        assert!(nexus.next_id.load(Ordering::Relaxed) > 2);
        nexus.shutdown().unwrap();
    }
}
