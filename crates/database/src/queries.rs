//! SQL query strings, grouped by entity. Kept as named constants rather
//! than inline in call sites so the claim query's exact locking semantics
//! are reviewable in one place.

/// Task table queries. The claim query is the one piece of SQL the whole
/// executor's correctness rests on: `FOR UPDATE SKIP LOCKED` makes the
/// `PENDING -> RUNNING` transition atomic across concurrently-running
/// executor processes without a separate advisory lock.
pub mod task_queries {
    pub const CLAIM_NEXT_PENDING: &str = r#"
        WITH next_task AS (
            SELECT id FROM analysis_tasks
            WHERE state = 'pending'
              AND (not_before IS NULL OR not_before <= now())
            ORDER BY priority DESC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE analysis_tasks
        SET state = 'running', started_at = now()
        FROM next_task
        WHERE analysis_tasks.id = next_task.id
        RETURNING analysis_tasks.*
    "#;

    pub const INSERT_TASK: &str = r#"
        INSERT INTO analysis_tasks (
            id, app_model_identifier, app_number, kind, tool_selection,
            configuration, priority, state, parent_pipeline_id, created_at,
            preflight_retries, transient_retries, stuck_retries, has_result_files
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING *
    "#;

    pub const GET_TASK_BY_ID: &str = "SELECT * FROM analysis_tasks WHERE id = $1";

    pub const GET_TASKS_BY_PIPELINE: &str =
        "SELECT * FROM analysis_tasks WHERE parent_pipeline_id = $1 ORDER BY created_at ASC";

    pub const RETRY_AS_PENDING: &str = r#"
        UPDATE analysis_tasks
        SET state = 'pending', not_before = $2,
            transient_retries = transient_retries + $3,
            preflight_retries = preflight_retries + $4,
            stuck_retries = stuck_retries + $5
        WHERE id = $1
        RETURNING *
    "#;

    pub const COMPLETE_TASK: &str = r#"
        UPDATE analysis_tasks
        SET state = $2, completed_at = now(), result_summary = $3,
            has_result_files = $4, error_detail = $5
        WHERE id = $1
        RETURNING *
    "#;

    pub const FAIL_TASK: &str = r#"
        UPDATE analysis_tasks
        SET state = 'failed', completed_at = now(), error_detail = $2
        WHERE id = $1
        RETURNING *
    "#;

    pub const CANCEL_TASK: &str = r#"
        UPDATE analysis_tasks
        SET state = 'cancelled', completed_at = now()
        WHERE id = $1 AND state NOT IN ('completed', 'partial_success', 'failed', 'cancelled')
        RETURNING *
    "#;

    /// Marks a task as acknowledging a cancel request without finalising it
    /// yet; the executor flips it to `cancelled` once the in-flight replica
    /// call actually stops. No-op on an already-terminal task.
    pub const MARK_CANCELLING: &str = r#"
        UPDATE analysis_tasks
        SET state = 'cancelling'
        WHERE id = $1 AND state NOT IN ('completed', 'partial_success', 'failed', 'cancelled')
        RETURNING *
    "#;

    pub const FIND_STUCK_RUNNING: &str = r#"
        SELECT * FROM analysis_tasks
        WHERE state = 'running' AND started_at < $1
    "#;

    pub const FIND_MISSING_RESULT_FILES: &str = r#"
        SELECT * FROM analysis_tasks
        WHERE state IN ('completed', 'partial_success') AND has_result_files = false
    "#;

    pub const MARK_RESULT_FILES_WRITTEN: &str =
        "UPDATE analysis_tasks SET has_result_files = true WHERE id = $1";
}

pub mod pipeline_queries {
    pub const INSERT_PIPELINE: &str = r#"
        INSERT INTO pipelines (id, state, steps, created_at, retain_failed_children)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    "#;

    pub const GET_PIPELINE_BY_ID: &str = "SELECT * FROM pipelines WHERE id = $1";

    pub const UPDATE_PIPELINE_STATE: &str = r#"
        UPDATE pipelines
        SET state = $2, steps = $3, completed_at = $4
        WHERE id = $1
        RETURNING *
    "#;

    pub const LIST_NON_TERMINAL: &str =
        "SELECT * FROM pipelines WHERE state = 'running' ORDER BY created_at ASC";
}

pub mod subject_application_queries {
    pub const UPSERT: &str = r#"
        INSERT INTO subject_applications (model_identifier, app_number, backend_port, frontend_port)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (model_identifier, app_number) DO NOTHING
        RETURNING *
    "#;

    pub const GET: &str =
        "SELECT * FROM subject_applications WHERE model_identifier = $1 AND app_number = $2";

    pub const MARK_MISSING: &str = r#"
        UPDATE subject_applications
        SET missing_since = now()
        WHERE model_identifier = $1 AND app_number = $2 AND missing_since IS NULL
        RETURNING *
    "#;

    pub const CLEAR_MISSING: &str = r#"
        UPDATE subject_applications
        SET missing_since = NULL
        WHERE model_identifier = $1 AND app_number = $2
        RETURNING *
    "#;

    pub const FIND_ELIGIBLE_FOR_DELETION: &str = r#"
        SELECT * FROM subject_applications
        WHERE missing_since IS NOT NULL AND missing_since <= $1 AND deleted_at IS NULL
    "#;

    /// Every non-deleted application, for the maintenance sweep to check
    /// against the filesystem one by one. `deleted_at` rows are excluded —
    /// they're tombstones, not candidates for `mark_missing`/`clear_missing`.
    pub const LIST_ACTIVE: &str =
        "SELECT * FROM subject_applications WHERE deleted_at IS NULL ORDER BY model_identifier, app_number";

    pub const SOFT_DELETE: &str = r#"
        UPDATE subject_applications SET deleted_at = now()
        WHERE model_identifier = $1 AND app_number = $2
    "#;
}
