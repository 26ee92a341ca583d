//! Collaborator traits for the action lifecycle.
//!
//! These traits are the seams between the engine and everything it does not
//! own:
//!
//! - `RecordStore`:   persistence for projects, threads, actions, artifacts
//!   and the audit chain, and the only place transactions happen
//! - `ArtifactStore`: keyed blob store used by the `artifact.store` handler
//! - `ActionHandler`: one executor per action type, looked up by the registry
//!
//! The engine never holds a lock across a call into a handler. Handlers that
//! need persistence get the store through `HandlerContext`.

use caravel_audit::{AuditEvent, AuditFilter};
use caravel_contracts::{
    action::Action,
    error::CaravelResult,
    execution::HandlerResult,
    ids::{ActionId, ArtifactId, ProjectId, ThreadId},
    records::{Artifact, ArtifactFilter, Message, NewArtifact, Project, Thread},
};

use crate::unit_of_work::UnitOfWork;

/// Persistence for every record the runtime touches.
///
/// Implementations must enforce three things the engine relies on for
/// correctness under concurrent callers:
///
/// 1. `idempotency_key` is unique: an insert that would duplicate it fails
///    with `CaravelError::DuplicateIdempotencyKey` and writes nothing.
/// 2. A guarded update only applies while the stored status still equals
///    the expected status; otherwise `CaravelError::StaleStatus`.
/// 3. `commit()` is all-or-nothing, audit events included.
pub trait RecordStore: Send + Sync {
    /// Insert a project. Fails with `AlreadyExists` on a duplicate slug.
    fn insert_project(&self, project: &Project) -> CaravelResult<()>;

    fn project(&self, id: &ProjectId) -> CaravelResult<Option<Project>>;

    /// Insert a thread. Fails with `NotFound` if its project does not exist.
    fn insert_thread(&self, thread: &Thread) -> CaravelResult<()>;

    fn thread(&self, id: &ThreadId) -> CaravelResult<Option<Thread>>;

    /// Insert a message. Fails with `NotFound` if its thread does not exist.
    fn insert_message(&self, message: &Message) -> CaravelResult<()>;

    /// Messages of a thread, oldest first.
    fn messages_for_thread(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Message>>;

    fn action(&self, id: &ActionId) -> CaravelResult<Option<Action>>;

    fn action_by_idempotency_key(&self, key: &str) -> CaravelResult<Option<Action>>;

    /// Actions of a thread, oldest first.
    fn actions_for_thread(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Action>>;

    /// Apply a unit of work atomically and return the audit events it sealed.
    fn commit(&self, work: UnitOfWork) -> CaravelResult<Vec<AuditEvent>>;

    /// Insert artifact metadata. Fails with `NotFound` if a referenced
    /// project, thread or action does not exist.
    fn insert_artifact(&self, artifact: &Artifact) -> CaravelResult<()>;

    fn artifact(&self, id: &ArtifactId) -> CaravelResult<Option<Artifact>>;

    /// Artifacts matching `filter`, newest first.
    fn artifacts(&self, filter: &ArtifactFilter) -> CaravelResult<Vec<Artifact>>;

    /// Audit events matching `filter`, in chain order.
    fn audit_events(&self, filter: &AuditFilter) -> CaravelResult<Vec<AuditEvent>>;

    /// Recompute the audit hash chain from the stored events.
    fn verify_audit_chain(&self) -> CaravelResult<bool>;
}

/// A keyed blob store for artifact content.
pub trait ArtifactStore: Send + Sync {
    /// Store `request.content` and record its metadata.
    ///
    /// Fails with `NotFound` if the referenced project, thread or action does
    /// not exist; nothing is written in that case.
    fn create(&self, request: NewArtifact) -> CaravelResult<Artifact>;

    fn get(&self, id: &ArtifactId) -> CaravelResult<Option<Artifact>>;

    fn list(&self, filter: &ArtifactFilter) -> CaravelResult<Vec<Artifact>>;

    fn read_bytes(&self, artifact: &Artifact) -> CaravelResult<Vec<u8>>;
}

/// What a handler can reach besides the action itself.
pub struct HandlerContext<'a> {
    /// The store the action lives in.
    pub store: &'a dyn RecordStore,
    /// The project owning the action's thread, if it still resolves.
    pub project_id: Option<ProjectId>,
}

/// Executes one action type.
///
/// Returns the structured `data` of the result, or a `HandlerError`. The
/// registry wraps `data` in the standard result envelope; the engine turns an
/// error into a FAILED action. A handler never changes the action's status.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, ctx: &HandlerContext<'_>, action: &Action) -> HandlerResult;
}
