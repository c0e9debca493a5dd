use serde_json::Value;

use crate::error::QueueError;
use crate::registry::Kwargs;
use crate::types::JobId;

/// Load a job's positional arguments, ordered by position.
pub async fn load_args<'c, E>(executor: E, job_id: JobId) -> Result<Vec<Value>, QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query_scalar(
        r#"
SELECT
    arg
FROM
    dbqueue_job_args
WHERE
    job_id = $1
ORDER BY
    position
        "#,
    )
    .bind(job_id)
    .fetch_all(executor)
    .await
    .map_err(QueueError::query("SELECT"))
}

/// Load a job's keyword arguments into a map.
///
/// The schema does not enforce uniqueness on `(job_id, param_name)`; rows
/// are folded in insertion order so the last observed value wins.
pub async fn load_kwargs<'c, E>(executor: E, job_id: JobId) -> Result<Kwargs, QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let rows: Vec<(String, Value)> = sqlx::query_as(
        r#"
SELECT
    param_name,
    arg
FROM
    dbqueue_job_kwargs
WHERE
    job_id = $1
ORDER BY
    id
        "#,
    )
    .bind(job_id)
    .fetch_all(executor)
    .await
    .map_err(QueueError::query("SELECT"))?;

    let mut kwargs = Kwargs::new();
    for (param_name, arg) in rows {
        kwargs.insert(param_name, arg);
    }

    Ok(kwargs)
}
