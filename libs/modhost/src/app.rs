//! The application: the lifecycle state machine tying everything together.
//!
//! Phase order inside one activation:
//! - `start`: load descriptors → instantiate surviving modules → order by
//!   dependencies → register → `initialize`.
//! - `initialize`: configure pass, then install+initialize pass, honoring
//!   the [`RequestedAction`] each hook returns.
//! - `uninitialize`: backward teardown with the uninstall sweep, then a
//!   forward refresh of stale status snapshots.
//! - `stop`: `uninitialize`, then discard the module set.
//!
//! Design notes:
//! - One orchestration-wide lock, owned by the [`Application`] value,
//!   serializes the public operations. The design is single-writer: hooks
//!   run under that lock on the calling task, and no other orchestration
//!   call proceeds while one is in flight.
//! - A hook requesting a restart never re-enters `start` recursively. Each
//!   phase function returns a flow value and a single driver loop interprets
//!   it, so the stack stays bounded no matter how often hooks restart the
//!   pipeline.
//! - Descriptors are persisted on every `initialize`/`uninitialize` exit
//!   path, success or failure, so version and status changes already applied
//!   survive a later hook failure.

use std::sync::Arc;

use parking_lot::RwLock;
use semver::Version;
use tokio::sync::Mutex;

use crate::context::ModuleCtx;
use crate::contracts::{Module, RequestedAction};
use crate::descriptor::{DescriptorStore, ModuleDescriptor, ModuleStatus};
use crate::error::LifecycleError;
use crate::registry::ModuleFactory;
use crate::resolver;

type SharedDescriptor = Arc<RwLock<ModuleDescriptor>>;

/// Coarse lifecycle phase of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Stopped,
    /// Started, modules registered, pipeline not (or no longer) completed.
    Uninitialized,
    /// Started and the initialize pipeline completed.
    Initialized,
}

/// Live module instance paired with its descriptor and the status snapshot
/// taken at registration time.
///
/// `frozen_status` is immutable: teardown must see the status as it was when
/// this activation began, not the live value another module may have flipped
/// mid-run. A record is replaced wholesale when its snapshot is refreshed.
pub(crate) struct ModuleRecord {
    pub(crate) type_id: String,
    pub(crate) frozen_status: ModuleStatus,
    pub(crate) module: Arc<dyn Module>,
    descriptor: SharedDescriptor,
}

impl ModuleRecord {
    fn new(frozen_status: ModuleStatus, module: Arc<dyn Module>, descriptor: SharedDescriptor) -> Self {
        let type_id = descriptor.read().type_id.clone();
        Self {
            type_id,
            frozen_status,
            module,
            descriptor,
        }
    }

    fn refreshed(&self, status: ModuleStatus) -> Self {
        Self {
            type_id: self.type_id.clone(),
            frozen_status: status,
            module: Arc::clone(&self.module),
            descriptor: Arc::clone(&self.descriptor),
        }
    }

    fn installed_version(&self) -> Option<Version> {
        self.descriptor.read().installed_version.clone()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(descriptor: ModuleDescriptor, module: Arc<dyn Module>) -> Self {
        let status = descriptor.status;
        Self::new(status, module, Arc::new(RwLock::new(descriptor)))
    }
}

enum AppState {
    Stopped,
    Started {
        records: Vec<ModuleRecord>,
        initialized: bool,
    },
}

/// Outcome of one full pipeline run.
enum Flow {
    Completed,
    Restart,
}

/// Outcome of a single pass over the record list.
enum PassFlow {
    Completed,
    Reinitialize,
    Restart,
}

/// Next step of the driver loop.
enum Step {
    Boot,
    Pipeline,
}

struct Shared {
    descriptors: RwLock<Vec<SharedDescriptor>>,
    phase: RwLock<AppPhase>,
    store: Arc<dyn DescriptorStore>,
    factory: Arc<dyn ModuleFactory>,
}

/// Hook-facing handle to the application.
///
/// Handed to every hook through [`ModuleCtx`]. It only touches descriptor
/// state, never the orchestration lock, so hooks may call it freely while a
/// lifecycle operation is in flight.
#[derive(Clone)]
pub struct AppHandle {
    shared: Arc<Shared>,
}

impl AppHandle {
    /// Snapshot of the descriptor for `type_id`, if present.
    pub fn descriptor(&self, type_id: &str) -> Option<ModuleDescriptor> {
        self.shared
            .descriptors
            .read()
            .iter()
            .map(|d| d.read().clone())
            .find(|d| d.type_id == type_id)
    }

    /// Snapshot of the whole live descriptor list.
    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.shared
            .descriptors
            .read()
            .iter()
            .map(|d| d.read().clone())
            .collect()
    }

    /// Flip the live status of every descriptor for `type_id`; returns
    /// whether any matched. Marking a module
    /// [`Uninstalling`](ModuleStatus::Uninstalling) makes the next teardown
    /// run its uninstall hook and reset the descriptor.
    pub fn set_status(&self, type_id: &str, status: ModuleStatus) -> bool {
        let descriptors = self.shared.descriptors.read();
        let mut matched = false;
        for descriptor in descriptors.iter() {
            let mut descriptor = descriptor.write();
            if descriptor.type_id == type_id {
                descriptor.status = status;
                matched = true;
            }
        }
        matched
    }

    /// Append a descriptor to the live list. It is persisted on the next
    /// initialize/uninitialize exit and instantiated by the next start; pair
    /// with [`RequestedAction::Restart`] to activate the module in-flight.
    pub fn add_descriptor(&self, descriptor: ModuleDescriptor) {
        self.shared
            .descriptors
            .write()
            .push(Arc::new(RwLock::new(descriptor)));
    }

    /// Remove every descriptor for `type_id`; returns how many were removed.
    /// Records of the current activation keep working off their own copy
    /// until the module set is discarded.
    pub fn remove_descriptor(&self, type_id: &str) -> usize {
        let mut descriptors = self.shared.descriptors.write();
        let before = descriptors.len();
        descriptors.retain(|d| d.read().type_id != type_id);
        before - descriptors.len()
    }

    /// Coarse lifecycle phase, readable from inside hooks.
    pub fn phase(&self) -> AppPhase {
        *self.shared.phase.read()
    }
}

/// Composes an application out of modules and drives them through their
/// lifecycle.
///
/// All public operations are serialized by one internal lock; exactly one of
/// them is in flight at a time. Hooks that never return therefore wedge the
/// application permanently — there is no cancellation and no timeout.
pub struct Application {
    state: Mutex<AppState>,
    shared: Arc<Shared>,
}

impl Application {
    pub fn new(store: Arc<dyn DescriptorStore>, factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            state: Mutex::new(AppState::Stopped),
            shared: Arc::new(Shared {
                descriptors: RwLock::new(Vec::new()),
                phase: RwLock::new(AppPhase::Stopped),
                store,
                factory,
            }),
        }
    }

    /// Hook-facing handle; cheap to clone.
    pub fn handle(&self) -> AppHandle {
        AppHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn phase(&self) -> AppPhase {
        *self.shared.phase.read()
    }

    pub fn is_started(&self) -> bool {
        self.phase() != AppPhase::Stopped
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == AppPhase::Initialized
    }

    /// Start the application: load descriptors, instantiate every surviving
    /// module, order them by dependencies and run the initialize pipeline.
    ///
    /// Descriptors survive loading unless they are disabled *and* were never
    /// installed; a disabled-but-installed module still loads so its
    /// uninstall can run, but its hooks are otherwise skipped.
    ///
    /// # Errors
    /// [`LifecycleError::AlreadyStarted`] when not stopped; store, factory,
    /// resolver and hook failures as their respective variants. A failed
    /// start registers no partial module set.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state).await
    }

    /// Tear the application down and discard the module set.
    ///
    /// # Errors
    /// [`LifecycleError::NotRunning`] when already stopped; teardown hook
    /// failures propagate and leave the module set registered.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await
    }

    /// Run the initialize pipeline. No-op when already initialized.
    ///
    /// # Errors
    /// [`LifecycleError::NotStarted`] when stopped; hook and store failures
    /// otherwise. Descriptors are persisted even on the failure paths.
    pub async fn initialize(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await
    }

    /// Run the teardown pass. No-op when not initialized.
    ///
    /// # Errors
    /// [`LifecycleError::NotStarted`] when stopped; hook and store failures
    /// otherwise. Descriptors are persisted even on the failure paths.
    pub async fn uninitialize(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().await;
        self.uninitialize_locked(&mut state).await
    }

    /// Uninitialize, then initialize, under one lock acquisition.
    ///
    /// # Errors
    /// As [`Application::uninitialize`] and [`Application::initialize`].
    pub async fn reinitialize(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().await;
        self.uninitialize_locked(&mut state).await?;
        self.initialize_locked(&mut state).await
    }

    /// Stop, then start, under one lock acquisition.
    ///
    /// # Errors
    /// As [`Application::stop`] and [`Application::start`].
    pub async fn restart(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await?;
        self.start_locked(&mut state).await
    }

    async fn start_locked(&self, state: &mut AppState) -> Result<(), LifecycleError> {
        if !matches!(*state, AppState::Stopped) {
            return Err(LifecycleError::AlreadyStarted);
        }
        self.drive(state, Step::Boot).await
    }

    async fn stop_locked(&self, state: &mut AppState) -> Result<(), LifecycleError> {
        if matches!(*state, AppState::Stopped) {
            return Err(LifecycleError::NotRunning);
        }
        self.uninitialize_locked(state).await?;
        tracing::info!("Phase: stop");
        *state = AppState::Stopped;
        self.set_phase(AppPhase::Stopped);
        Ok(())
    }

    async fn initialize_locked(&self, state: &mut AppState) -> Result<(), LifecycleError> {
        match state {
            AppState::Stopped => Err(LifecycleError::NotStarted),
            AppState::Started {
                initialized: true, ..
            } => Ok(()),
            AppState::Started { .. } => self.drive(state, Step::Pipeline).await,
        }
    }

    async fn uninitialize_locked(&self, state: &mut AppState) -> Result<(), LifecycleError> {
        match state {
            AppState::Stopped => Err(LifecycleError::NotStarted),
            AppState::Started {
                initialized: false, ..
            } => Ok(()),
            AppState::Started {
                records,
                initialized,
            } => {
                tracing::info!("Phase: uninitialize");
                let end = records.len();
                let result = self.teardown_records(records, end).await;
                // The activation is over even when a teardown hook failed;
                // re-entry must not call uninitialize twice.
                *initialized = false;
                self.set_phase(AppPhase::Uninitialized);
                match result {
                    Ok(()) => self.save_descriptors().await,
                    Err(err) => {
                        if let Err(save_err) = self.save_descriptors().await {
                            tracing::warn!(
                                error = %save_err,
                                "failed to persist descriptors after a failing teardown"
                            );
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    /// Driver loop for in-pipeline restarts: phase functions return a flow
    /// value instead of recursing, so a hook that keeps requesting
    /// [`RequestedAction::Restart`] cannot grow the stack.
    async fn drive(&self, state: &mut AppState, first: Step) -> Result<(), LifecycleError> {
        let mut step = first;
        loop {
            step = match step {
                Step::Boot => {
                    self.boot(state).await?;
                    Step::Pipeline
                }
                Step::Pipeline => match self.run_initialize(state).await? {
                    Flow::Completed => return Ok(()),
                    Flow::Restart => {
                        tracing::info!("restart requested; discarding the module set");
                        *state = AppState::Stopped;
                        self.set_phase(AppPhase::Stopped);
                        Step::Boot
                    }
                },
            };
        }
    }

    /// Load descriptors, instantiate the surviving modules and register the
    /// ordered record list.
    async fn boot(&self, state: &mut AppState) -> Result<(), LifecycleError> {
        let loaded = self
            .shared
            .store
            .load()
            .await
            .map_err(LifecycleError::LoadDescriptors)?;
        tracing::info!(descriptors = loaded.len(), "Phase: load");

        let mut shared_descriptors = Vec::with_capacity(loaded.len());
        let mut records = Vec::new();
        for descriptor in loaded {
            let survives = descriptor.status != ModuleStatus::Disabled
                || descriptor.installed_version.is_some();
            let type_id = descriptor.type_id.clone();
            let status = descriptor.status;
            let shared = Arc::new(RwLock::new(descriptor));
            if survives {
                let module = self.shared.factory.instantiate(&type_id)?;
                records.push(ModuleRecord::new(status, module, Arc::clone(&shared)));
            }
            shared_descriptors.push(shared);
        }

        let records = resolver::sort_by_dependencies(records)?;

        // Register only after the whole set resolved; a failed start leaves
        // no partial module list behind.
        *self.shared.descriptors.write() = shared_descriptors;
        tracing::info!(modules = records.len(), "Phase: register");
        *state = AppState::Started {
            records,
            initialized: false,
        };
        self.set_phase(AppPhase::Uninitialized);
        Ok(())
    }

    /// One initialize call: the two-pass pipeline plus the guarantee that
    /// descriptors are persisted on every exit path.
    async fn run_initialize(&self, state: &mut AppState) -> Result<Flow, LifecycleError> {
        let result = self.pipeline(state).await;
        match result {
            Ok(flow) => {
                self.save_descriptors().await?;
                Ok(flow)
            }
            Err(err) => {
                if let Err(save_err) = self.save_descriptors().await {
                    tracing::warn!(
                        error = %save_err,
                        "failed to persist descriptors after a failing pipeline"
                    );
                }
                Err(err)
            }
        }
    }

    async fn pipeline(&self, state: &mut AppState) -> Result<Flow, LifecycleError> {
        loop {
            match self.configure_pass(state).await? {
                PassFlow::Completed => {}
                PassFlow::Reinitialize => continue,
                PassFlow::Restart => return Ok(Flow::Restart),
            }
            match self.install_pass(state).await? {
                PassFlow::Completed => {
                    if let AppState::Started { initialized, .. } = state {
                        *initialized = true;
                    }
                    self.set_phase(AppPhase::Initialized);
                    tracing::info!("Phase: initialized");
                    return Ok(Flow::Completed);
                }
                PassFlow::Reinitialize => {}
                PassFlow::Restart => return Ok(Flow::Restart),
            }
        }
    }

    /// Configure pass: version-gated configure hooks in dependency order.
    ///
    /// A requested reinitialize rescans from the top of this pass, so a
    /// module can react to an earlier module's reconfiguration.
    async fn configure_pass(&self, state: &mut AppState) -> Result<PassFlow, LifecycleError> {
        let AppState::Started { records, .. } = state else {
            return Ok(PassFlow::Completed);
        };
        tracing::info!("Phase: configure");

        let mut i = 0;
        while i < records.len() {
            let record = &records[i];
            if record.frozen_status != ModuleStatus::Enabled {
                i += 1;
                continue;
            }
            let Some(installable) = record.module.as_installable() else {
                i += 1;
                continue;
            };
            let build = installable.build_version();
            if !version_outdated(record.installed_version().as_ref(), &build) {
                i += 1;
                continue;
            }

            tracing::debug!(module = %record.type_id, version = %build, "configure");
            let ctx = self.hook_ctx(record);
            let action = installable.configure(&ctx).await.map_err(|source| {
                LifecycleError::Configure {
                    module: record.type_id.clone(),
                    source,
                }
            })?;
            match action {
                RequestedAction::None => i += 1,
                RequestedAction::Reinitialize => {
                    tracing::debug!(module = %record.type_id, "configure requested a rescan");
                    i = 0;
                }
                RequestedAction::Restart => return Ok(PassFlow::Restart),
            }
        }
        Ok(PassFlow::Completed)
    }

    /// Install+initialize pass.
    ///
    /// An install that returns has its build version recorded no matter what
    /// follow-up it asked for, so it cannot run twice for the same version —
    /// not even across an unwound and retried pipeline. A non-`None` action
    /// unwinds everything before the current record and short-circuits the
    /// pass.
    async fn install_pass(&self, state: &mut AppState) -> Result<PassFlow, LifecycleError> {
        let AppState::Started { records, .. } = state else {
            return Ok(PassFlow::Completed);
        };
        tracing::info!("Phase: install+initialize");

        let mut i = 0;
        while i < records.len() {
            let record = &records[i];
            if record.frozen_status != ModuleStatus::Enabled {
                i += 1;
                continue;
            }

            let mut action = RequestedAction::None;
            if let Some(installable) = record.module.as_installable() {
                let build = installable.build_version();
                if version_outdated(record.installed_version().as_ref(), &build) {
                    tracing::debug!(module = %record.type_id, version = %build, "install");
                    let ctx = self.hook_ctx(record);
                    action = installable.install(&ctx).await.map_err(|source| {
                        LifecycleError::Install {
                            module: record.type_id.clone(),
                            source,
                        }
                    })?;
                    record.descriptor.write().installed_version = Some(build);
                }
            }

            if action == RequestedAction::None {
                tracing::debug!(module = %record.type_id, "initialize");
                let ctx = self.hook_ctx(record);
                action = record.module.initialize(&ctx).await.map_err(|source| {
                    LifecycleError::Initialize {
                        module: record.type_id.clone(),
                        source,
                    }
                })?;
            }

            match action {
                RequestedAction::None => i += 1,
                RequestedAction::Reinitialize => {
                    tracing::info!(module = %record.type_id, "reinitialize requested; unwinding this pass");
                    self.teardown_records(records, i).await?;
                    return Ok(PassFlow::Reinitialize);
                }
                RequestedAction::Restart => {
                    tracing::info!(module = %record.type_id, "restart requested; unwinding this pass");
                    self.teardown_records(records, i).await?;
                    return Ok(PassFlow::Restart);
                }
            }
        }
        Ok(PassFlow::Completed)
    }

    /// Backward teardown of `records[..end]`: uninitialize what this
    /// activation initialized, run the uninstall sweep, then refresh the
    /// snapshot of every record whose live status moved underneath it so a
    /// re-entry observes consistent state.
    async fn teardown_records(
        &self,
        records: &mut [ModuleRecord],
        end: usize,
    ) -> Result<(), LifecycleError> {
        for idx in (0..end).rev() {
            let record = &records[idx];
            if record.frozen_status == ModuleStatus::Enabled {
                tracing::debug!(module = %record.type_id, "uninitialize");
                record.module.uninitialize().await.map_err(|source| {
                    LifecycleError::Uninitialize {
                        module: record.type_id.clone(),
                        source,
                    }
                })?;
            }
            // The uninstall sweep keys off the live status, not the frozen
            // one: a module disabled mid-run can still be uninstalled here.
            let live_status = record.descriptor.read().status;
            if live_status == ModuleStatus::Uninstalling {
                if let Some(installable) = record.module.as_installable() {
                    tracing::debug!(module = %record.type_id, "uninstall");
                    let ctx = self.hook_ctx(record);
                    installable.uninstall(&ctx).await.map_err(|source| {
                        LifecycleError::Uninstall {
                            module: record.type_id.clone(),
                            source,
                        }
                    })?;
                }
                let mut descriptor = record.descriptor.write();
                descriptor.status = ModuleStatus::Disabled;
                descriptor.installed_version = None;
            }
        }

        for idx in 0..end {
            let live_status = records[idx].descriptor.read().status;
            if records[idx].frozen_status != live_status {
                records[idx] = records[idx].refreshed(live_status);
            }
        }
        Ok(())
    }

    async fn save_descriptors(&self) -> Result<(), LifecycleError> {
        let snapshot: Vec<ModuleDescriptor> = self
            .shared
            .descriptors
            .read()
            .iter()
            .map(|d| d.read().clone())
            .collect();
        self.shared
            .store
            .save(&snapshot)
            .await
            .map_err(LifecycleError::SaveDescriptors)
    }

    fn hook_ctx(&self, record: &ModuleRecord) -> ModuleCtx {
        let previous = record
            .installed_version()
            .unwrap_or_else(|| Version::new(0, 0, 0));
        ModuleCtx::new(self.handle(), previous)
    }

    fn set_phase(&self, phase: AppPhase) {
        *self.shared.phase.write() = phase;
    }
}

fn version_outdated(installed: Option<&Version>, build: &Version) -> bool {
    match installed {
        None => true,
        Some(installed) => installed < build,
    }
}
