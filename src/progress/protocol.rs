use crate::state::types::{SubtaskId, TaskId};

const PROGRESS_PREFIX: &str = "PROGRESS";
const RESULT_PREFIX: &str = "RESULT:";

/// `PROGRESS:<taskId>:<summary>\n`
pub fn encode_progress(task_id: TaskId, summary: &str) -> String {
    format!("{}:{}:{}\n", PROGRESS_PREFIX, task_id, summary)
}

/// A worker-pushed sub-task result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultReport {
    pub task_id: TaskId,
    pub subtask_id: SubtaskId,
    pub result: String,
}

impl ResultReport {
    /// Parses `RESULT:<taskId>:<subId>[:<result>]`. The result is everything after the
    /// third colon and may be empty.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix(RESULT_PREFIX)?;
        let mut fields = rest.splitn(3, ':');

        let task_id = fields.next()?.trim().parse().ok()?;
        let subtask_id = fields.next()?.trim().parse().ok()?;
        let result = fields.next().unwrap_or_default().to_string();

        Some(Self {
            task_id,
            subtask_id,
            result,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{}:{}:{}\n",
            RESULT_PREFIX, self.task_id, self.subtask_id, self.result
        )
    }
}
