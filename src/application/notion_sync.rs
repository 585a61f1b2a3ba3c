use crate::application::NowProvider;
use crate::domain::models::{
    normalize_project_name, normalize_task_title, ConnectionStatus, EntityKind, NotionConnection,
    NotionMapping, PomodoroOverrides, Project, Task,
};
use crate::infrastructure::error::AppError;
use crate::infrastructure::notion_client::{
    DatabaseSchema, NotionApi, PageFields, PropertyKind, RemotePage, PROP_APP_ID, PROP_ARCHIVED,
    PROP_COMPLETED, PROP_NAME, PROP_PROJECT, PROP_TYPE,
};
use crate::infrastructure::storage::SqliteStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

const SYNC_FAILED_MESSAGE: &str = "Sync failed. Check the connection and try again.";

type MappingKey = (EntityKind, String);
type MappingTable = Mutex<HashMap<MappingKey, NotionMapping>>;

/// Counters for one sync run. Partial failures are tallied, never
/// re-raised, so the run always reports what it managed to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pulled: usize,
    pub pushed_creates: usize,
    pub pushed_updates: usize,
    pub applied_remote: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.pulled += other.pulled;
        self.pushed_creates += other.pushed_creates;
        self.pushed_updates += other.pushed_updates;
        self.applied_remote += other.applied_remote;
        self.warnings += other.warnings;
        self.errors += other.errors;
    }
}

/// All remote pages of both kinds, fetched once per run and indexed for
/// the counterpart lookups.
struct RemoteSnapshot {
    pages: Vec<RemotePage>,
    by_page_id: HashMap<String, usize>,
    by_app_id: HashMap<String, usize>,
}

impl RemoteSnapshot {
    fn new(pages: Vec<RemotePage>) -> Self {
        let mut by_page_id = HashMap::new();
        let mut by_app_id = HashMap::new();
        for (index, page) in pages.iter().enumerate() {
            by_page_id.insert(page.page_id.clone(), index);
            if let Some(app_id) = &page.app_id {
                by_app_id.entry(app_id.clone()).or_insert(index);
            }
        }
        Self {
            pages,
            by_page_id,
            by_app_id,
        }
    }

    fn page_by_id(&self, page_id: &str) -> Option<&RemotePage> {
        self.by_page_id.get(page_id).map(|&index| &self.pages[index])
    }

    fn page_by_app_id(&self, kind: EntityKind, app_id: &str) -> Option<&RemotePage> {
        self.by_app_id
            .get(app_id)
            .map(|&index| &self.pages[index])
            .filter(|page| page.kind == kind)
    }

    fn pages_of(&self, kind: EntityKind) -> VecDeque<RemotePage> {
        self.pages
            .iter()
            .filter(|page| page.kind == kind)
            .cloned()
            .collect()
    }

    /// Reflect an App ID write-back so the reconcile phase does not
    /// re-push a correlation that was already healed.
    fn set_app_id(&mut self, page_id: &str, app_id: String) {
        let Some(&index) = self.by_page_id.get(page_id) else {
            return;
        };
        if let Some(previous) = self.pages[index].app_id.take() {
            self.by_app_id.remove(&previous);
        }
        self.by_app_id.insert(app_id.clone(), index);
        self.pages[index].app_id = Some(app_id);
    }
}

/// Name lookups for the task "Project" property, which carries a project
/// name string rather than an id. Resolution only considers active
/// projects; the reverse map covers archived ones too so pushes keep
/// their label.
struct ProjectIndex {
    id_by_name: HashMap<String, String>,
    name_by_id: HashMap<String, String>,
}

impl ProjectIndex {
    fn new(projects: &[Project]) -> Self {
        let mut id_by_name = HashMap::new();
        let mut name_by_id = HashMap::new();
        for project in projects {
            name_by_id.insert(project.id.clone(), project.name.clone());
            if project.archived_at.is_none() {
                id_by_name
                    .entry(project.name.trim().to_lowercase())
                    .or_insert_with(|| project.id.clone());
            }
        }
        Self {
            id_by_name,
            name_by_id,
        }
    }

    fn resolve(&self, raw: &str) -> Option<&str> {
        self.id_by_name
            .get(&raw.trim().to_lowercase())
            .map(String::as_str)
    }

    fn name_of(&self, project_id: &str) -> Option<&str> {
        self.name_by_id.get(project_id).map(String::as_str)
    }
}

/// Lists the required property mismatches as "<Name> (<Kind>)". Empty
/// means the database is usable.
fn schema_problems(schema: &DatabaseSchema) -> Vec<String> {
    let mut problems = Vec::new();
    if !matches!(schema.property(PROP_NAME), Some(PropertyKind::Title)) {
        problems.push(format!("{PROP_NAME} (Title)"));
    }
    let type_ok = match schema.property(PROP_TYPE) {
        Some(PropertyKind::Select { options }) => {
            options.iter().any(|option| option == "Project")
                && options.iter().any(|option| option == "Task")
        }
        _ => false,
    };
    if !type_ok {
        problems.push(format!("{PROP_TYPE} (Select)"));
    }
    if !matches!(schema.property(PROP_COMPLETED), Some(PropertyKind::Checkbox)) {
        problems.push(format!("{PROP_COMPLETED} (Checkbox)"));
    }
    if !matches!(schema.property(PROP_PROJECT), Some(PropertyKind::RichText)) {
        problems.push(format!("{PROP_PROJECT} (Rich text)"));
    }
    if !matches!(schema.property(PROP_ARCHIVED), Some(PropertyKind::Checkbox)) {
        problems.push(format!("{PROP_ARCHIVED} (Checkbox)"));
    }
    if !matches!(schema.property(PROP_APP_ID), Some(PropertyKind::RichText)) {
        problems.push(format!("{PROP_APP_ID} (Rich text)"));
    }
    problems
}

/// Runs the handler over the queue from three workers. Item failures are
/// tallied and logged; the rest of the queue still drains.
async fn drain_queue<T, F, Fut>(items: VecDeque<T>, stage: &str, handle: F) -> SyncReport
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<SyncReport, AppError>>,
{
    let queue = Mutex::new(items);
    let tally = Mutex::new(SyncReport::default());
    let worker = || async {
        loop {
            let item = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(item) = item else { break };
            match handle(item).await {
                Ok(part) => tally
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .absorb(part),
                Err(error) => {
                    tracing::warn!(%error, stage, "sync item failed");
                    tally.lock().unwrap_or_else(PoisonError::into_inner).errors += 1;
                }
            }
        }
    };
    tokio::join!(worker(), worker(), worker());
    tally.into_inner().unwrap_or_else(PoisonError::into_inner)
}

/// Bidirectional reconciliation between local projects/tasks and pages
/// of a Notion database, correlated through the remote "App ID"
/// property.
pub struct NotionSyncService<N: NotionApi> {
    store: Arc<SqliteStore>,
    api: Arc<N>,
    now_provider: NowProvider,
}

impl<N: NotionApi> NotionSyncService<N> {
    pub fn new(store: Arc<SqliteStore>, api: Arc<N>) -> Self {
        Self {
            store,
            api,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn connect(
        &self,
        owner: &str,
        access_token: &str,
        database_id: &str,
    ) -> Result<NotionConnection, AppError> {
        self.store
            .save_notion_connection(owner, access_token, database_id, (self.now_provider)())
    }

    pub fn connection(&self, owner: &str) -> Result<Option<NotionConnection>, AppError> {
        self.store.get_notion_connection(owner)
    }

    /// One full sync run: validate the remote schema, pull unknown
    /// remote pages into local rows, then reconcile every local row
    /// against its remote counterpart. Row-level failures are tallied in
    /// the report; only structural failures abort the run.
    pub async fn sync_now(&self, owner: &str) -> Result<SyncReport, AppError> {
        let connection = self
            .store
            .get_notion_connection(owner)?
            .ok_or_else(|| AppError::NotFound(format!("notion connection for owner {owner}")))?;

        let schema = match self
            .api
            .fetch_schema(&connection.access_token, &connection.database_id)
            .await
        {
            Ok(schema) => schema,
            Err(error) => {
                self.stamp_failure(owner);
                return Err(error.into());
            }
        };
        let problems = schema_problems(&schema);
        if !problems.is_empty() {
            return Err(AppError::Validation(format!(
                "Notion database is missing required properties: {}",
                problems.join(", ")
            )));
        }

        let mut snapshot = match self.fetch_snapshot(&connection).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.stamp_failure(owner);
                return Err(error.into());
            }
        };

        let now = (self.now_provider)();
        let mut report = SyncReport::default();

        // Pull phase, projects before tasks so pulled tasks can resolve
        // their project names against freshly created projects.
        let write_backs: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());
        {
            let local_ids: HashSet<String> = self
                .store
                .list_projects(owner)?
                .into_iter()
                .map(|project| project.id)
                .collect();
            let part = drain_queue(snapshot.pages_of(EntityKind::Project), "pull projects", |page| {
                self.pull_project(owner, &connection, page, &local_ids, &write_backs, now)
            })
            .await;
            report.absorb(part);
        }
        {
            let index = ProjectIndex::new(&self.store.list_projects(owner)?);
            let local_ids: HashSet<String> = self
                .store
                .list_tasks(owner)?
                .into_iter()
                .map(|task| task.id)
                .collect();
            let part = drain_queue(snapshot.pages_of(EntityKind::Task), "pull tasks", |page| {
                self.pull_task(owner, &connection, page, &local_ids, &index, &write_backs, now)
            })
            .await;
            report.absorb(part);
        }
        for (page_id, app_id) in write_backs
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            snapshot.set_app_id(&page_id, app_id);
        }

        // Reconcile phase, per local row.
        let mappings: MappingTable = Mutex::new(
            self.store
                .list_notion_mappings(owner)?
                .into_iter()
                .map(|mapping| ((mapping.entity_kind, mapping.entity_id.clone()), mapping))
                .collect(),
        );
        {
            let projects: VecDeque<Project> = self.store.list_projects(owner)?.into();
            let part = drain_queue(projects, "reconcile projects", |project| {
                self.reconcile_project(owner, &connection, project, &snapshot, &mappings, now)
            })
            .await;
            report.absorb(part);
        }
        {
            let index = ProjectIndex::new(&self.store.list_projects(owner)?);
            let tasks: VecDeque<Task> = self.store.list_tasks(owner)?.into();
            let part = drain_queue(tasks, "reconcile tasks", |task| {
                self.reconcile_task(owner, &connection, task, &snapshot, &mappings, &index, now)
            })
            .await;
            report.absorb(part);
        }

        let finished = (self.now_provider)();
        if report.errors == 0 {
            self.store.mark_notion_connection(
                owner,
                ConnectionStatus::Success,
                None,
                Some(finished),
                finished,
            )?;
        } else {
            self.store.mark_notion_connection(
                owner,
                ConnectionStatus::Error,
                Some(SYNC_FAILED_MESSAGE),
                None,
                finished,
            )?;
        }
        tracing::info!(
            owner,
            pulled = report.pulled,
            pushed_creates = report.pushed_creates,
            pushed_updates = report.pushed_updates,
            applied_remote = report.applied_remote,
            warnings = report.warnings,
            errors = report.errors,
            "notion sync finished"
        );
        Ok(report)
    }

    fn stamp_failure(&self, owner: &str) {
        let stamped = self.store.mark_notion_connection(
            owner,
            ConnectionStatus::Error,
            Some(SYNC_FAILED_MESSAGE),
            None,
            (self.now_provider)(),
        );
        if let Err(error) = stamped {
            tracing::warn!(%error, "failed to stamp sync failure");
        }
    }

    async fn fetch_snapshot(
        &self,
        connection: &NotionConnection,
    ) -> Result<RemoteSnapshot, AppError> {
        let mut pages = Vec::new();
        for kind in [EntityKind::Project, EntityKind::Task] {
            let mut cursor: Option<String> = None;
            loop {
                let batch = self
                    .api
                    .query_pages(
                        &connection.access_token,
                        &connection.database_id,
                        kind,
                        cursor.as_deref(),
                    )
                    .await?;
                pages.extend(batch.pages);
                match batch.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
        }
        Ok(RemoteSnapshot::new(pages))
    }

    /// Create a local project for a remote page nobody claims. Reuses a
    /// uuid-shaped remote App ID, otherwise assigns a fresh id and
    /// writes it back to the page.
    async fn pull_project(
        &self,
        owner: &str,
        connection: &NotionConnection,
        page: RemotePage,
        local_ids: &HashSet<String>,
        write_backs: &Mutex<Vec<(String, String)>>,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, AppError> {
        let mut outcome = SyncReport::default();
        if page
            .app_id
            .as_deref()
            .map(|app_id| local_ids.contains(app_id))
            .unwrap_or(false)
        {
            return Ok(outcome);
        }

        let id = adopted_or_fresh_id(page.app_id.as_deref());
        let project = Project {
            id: id.clone(),
            name: normalize_project_name(&page.name),
            archived_at: page.archived.then_some(now),
            created_at: now,
            updated_at: now,
        };
        self.store.create_project(owner, &project)?;
        outcome.pulled += 1;

        self.write_back_app_id(connection, &page, &id, write_backs)
            .await?;
        self.record_mapping(owner, EntityKind::Project, &id, &page.page_id, Some(now))?;
        Ok(outcome)
    }

    async fn pull_task(
        &self,
        owner: &str,
        connection: &NotionConnection,
        page: RemotePage,
        local_ids: &HashSet<String>,
        index: &ProjectIndex,
        write_backs: &Mutex<Vec<(String, String)>>,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, AppError> {
        let mut outcome = SyncReport::default();
        if page
            .app_id
            .as_deref()
            .map(|app_id| local_ids.contains(app_id))
            .unwrap_or(false)
        {
            return Ok(outcome);
        }

        let id = adopted_or_fresh_id(page.app_id.as_deref());
        let (project_id, warnings) = resolve_project_name(index, page.project_name.as_deref());
        outcome.warnings += warnings;
        let task = Task {
            id: id.clone(),
            title: normalize_task_title(&page.name),
            completed: page.completed,
            project_id,
            archived_at: page.archived.then_some(now),
            scheduled_for: None,
            pomodoro: PomodoroOverrides::default(),
            created_at: now,
            updated_at: now,
        };
        self.store.create_task(owner, &task)?;
        outcome.pulled += 1;

        self.write_back_app_id(connection, &page, &id, write_backs)
            .await?;
        self.record_mapping(owner, EntityKind::Task, &id, &page.page_id, Some(now))?;
        Ok(outcome)
    }

    async fn write_back_app_id(
        &self,
        connection: &NotionConnection,
        page: &RemotePage,
        id: &str,
        write_backs: &Mutex<Vec<(String, String)>>,
    ) -> Result<(), AppError> {
        if page.app_id.as_deref() == Some(id) {
            return Ok(());
        }
        let fields = PageFields {
            kind: page.kind,
            name: page.name.clone(),
            completed: page.completed,
            project_name: page.project_name.clone(),
            archived: page.archived,
            app_id: id.to_string(),
        };
        self.api
            .update_page(&connection.access_token, &page.page_id, &fields)
            .await?;
        write_backs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((page.page_id.clone(), id.to_string()));
        Ok(())
    }

    fn record_mapping(
        &self,
        owner: &str,
        kind: EntityKind,
        entity_id: &str,
        page_id: &str,
        last_pulled_at: Option<DateTime<Utc>>,
    ) -> Result<NotionMapping, AppError> {
        let mapping = NotionMapping {
            entity_kind: kind,
            entity_id: entity_id.to_string(),
            page_id: page_id.to_string(),
            last_pulled_at,
        };
        self.store.upsert_notion_mapping(owner, &mapping)?;
        Ok(mapping)
    }

    /// Resolve the remote counterpart of a local row: the mapping's page
    /// first, then an App ID match in the snapshot, then an explicit
    /// remote query. Matches found outside the mapping heal it.
    async fn find_counterpart(
        &self,
        owner: &str,
        connection: &NotionConnection,
        kind: EntityKind,
        entity_id: &str,
        snapshot: &RemoteSnapshot,
        mappings: &MappingTable,
    ) -> Result<Option<(RemotePage, Option<DateTime<Utc>>)>, AppError> {
        let key = (kind, entity_id.to_string());
        let existing = mappings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(mapping) = &existing {
            if let Some(page) = snapshot.page_by_id(&mapping.page_id) {
                return Ok(Some((page.clone(), mapping.last_pulled_at)));
            }
        }

        let carried = existing.and_then(|mapping| mapping.last_pulled_at);
        if let Some(page) = snapshot.page_by_app_id(kind, entity_id) {
            let healed =
                self.record_mapping(owner, kind, entity_id, &page.page_id, carried)?;
            mappings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, healed);
            return Ok(Some((page.clone(), carried)));
        }

        let found = self
            .api
            .find_page_by_app_id(
                &connection.access_token,
                &connection.database_id,
                kind,
                entity_id,
            )
            .await?;
        if let Some(page) = found {
            let healed =
                self.record_mapping(owner, kind, entity_id, &page.page_id, carried)?;
            mappings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, healed);
            return Ok(Some((page, carried)));
        }
        Ok(None)
    }

    async fn reconcile_project(
        &self,
        owner: &str,
        connection: &NotionConnection,
        project: Project,
        snapshot: &RemoteSnapshot,
        mappings: &MappingTable,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, AppError> {
        let mut outcome = SyncReport::default();
        let counterpart = self
            .find_counterpart(
                owner,
                connection,
                EntityKind::Project,
                &project.id,
                snapshot,
                mappings,
            )
            .await?;

        let fields = PageFields {
            kind: EntityKind::Project,
            name: normalize_project_name(&project.name),
            completed: false,
            project_name: None,
            archived: project.archived_at.is_some(),
            app_id: project.id.clone(),
        };

        let Some((page, last_pulled_at)) = counterpart else {
            let created = self
                .api
                .create_page(&connection.access_token, &connection.database_id, &fields)
                .await?;
            let mapping =
                self.record_mapping(owner, EntityKind::Project, &project.id, &created.page_id, None)?;
            mappings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((EntityKind::Project, project.id.clone()), mapping);
            outcome.pushed_creates += 1;
            return Ok(outcome);
        };

        let remote_eligible = last_pulled_at
            .map(|pulled| page.last_edited > pulled)
            .unwrap_or(true);
        if remote_eligible && page.last_edited > project.updated_at {
            let desired_name = normalize_project_name(&page.name);
            let locally_archived = project.archived_at.is_some();
            if desired_name != project.name || page.archived != locally_archived {
                let archived_at = if page.archived {
                    project.archived_at.or(Some(now))
                } else {
                    None
                };
                self.store
                    .apply_project_fields(owner, &project.id, &desired_name, archived_at, now)?;
                outcome.applied_remote += 1;
            }
            let stamped = self.record_mapping(
                owner,
                EntityKind::Project,
                &project.id,
                &page.page_id,
                Some(now),
            )?;
            mappings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((EntityKind::Project, project.id.clone()), stamped);
        } else if project.updated_at > page.last_edited {
            let differs = fields.name != page.name
                || fields.archived != page.archived
                || page.app_id.as_deref() != Some(project.id.as_str());
            if differs {
                self.api
                    .update_page(&connection.access_token, &page.page_id, &fields)
                    .await?;
                outcome.pushed_updates += 1;
            }
        }
        Ok(outcome)
    }

    async fn reconcile_task(
        &self,
        owner: &str,
        connection: &NotionConnection,
        task: Task,
        snapshot: &RemoteSnapshot,
        mappings: &MappingTable,
        index: &ProjectIndex,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, AppError> {
        let mut outcome = SyncReport::default();
        let counterpart = self
            .find_counterpart(
                owner,
                connection,
                EntityKind::Task,
                &task.id,
                snapshot,
                mappings,
            )
            .await?;

        let fields = PageFields {
            kind: EntityKind::Task,
            name: normalize_task_title(&task.title),
            completed: task.completed,
            project_name: task
                .project_id
                .as_deref()
                .and_then(|project_id| index.name_of(project_id))
                .map(str::to_string),
            archived: task.archived_at.is_some(),
            app_id: task.id.clone(),
        };

        let Some((page, last_pulled_at)) = counterpart else {
            let created = self
                .api
                .create_page(&connection.access_token, &connection.database_id, &fields)
                .await?;
            let mapping =
                self.record_mapping(owner, EntityKind::Task, &task.id, &created.page_id, None)?;
            mappings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((EntityKind::Task, task.id.clone()), mapping);
            outcome.pushed_creates += 1;
            return Ok(outcome);
        };

        let remote_eligible = last_pulled_at
            .map(|pulled| page.last_edited > pulled)
            .unwrap_or(true);
        if remote_eligible && page.last_edited > task.updated_at {
            let desired_title = normalize_task_title(&page.name);
            let (desired_project, warnings) =
                resolve_project_name(index, page.project_name.as_deref());
            outcome.warnings += warnings;
            let locally_archived = task.archived_at.is_some();
            let differs = desired_title != task.title
                || page.completed != task.completed
                || desired_project != task.project_id
                || page.archived != locally_archived;
            if differs {
                let archived_at = if page.archived {
                    task.archived_at.or(Some(now))
                } else {
                    None
                };
                self.store.apply_task_fields(
                    owner,
                    &task.id,
                    &desired_title,
                    page.completed,
                    desired_project.as_deref(),
                    archived_at,
                    now,
                )?;
                outcome.applied_remote += 1;
            }
            let stamped =
                self.record_mapping(owner, EntityKind::Task, &task.id, &page.page_id, Some(now))?;
            mappings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((EntityKind::Task, task.id.clone()), stamped);
        } else if task.updated_at > page.last_edited {
            let differs = fields.name != page.name
                || fields.completed != page.completed
                || fields.project_name != page.project_name
                || fields.archived != page.archived
                || page.app_id.as_deref() != Some(task.id.as_str());
            if differs {
                self.api
                    .update_page(&connection.access_token, &page.page_id, &fields)
                    .await?;
                outcome.pushed_updates += 1;
            }
        }
        Ok(outcome)
    }
}

/// Reuse a uuid-shaped remote App ID so correlation survives the pull;
/// anything else gets a fresh id.
fn adopted_or_fresh_id(app_id: Option<&str>) -> String {
    app_id
        .filter(|candidate| Uuid::parse_str(candidate).is_ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Case-insensitive, trimmed lookup of a remote project name against
/// active local projects. An unresolvable non-empty name detaches the
/// task and counts one warning.
fn resolve_project_name(
    index: &ProjectIndex,
    project_name: Option<&str>,
) -> (Option<String>, usize) {
    let Some(raw) = project_name else {
        return (None, 0);
    };
    if raw.trim().is_empty() {
        return (None, 0);
    }
    match index.resolve(raw) {
        Some(project_id) => (Some(project_id.to_string()), 0),
        None => {
            tracing::warn!(project_name = raw, "unresolvable notion project name");
            (None, 1)
        }
    }
}
