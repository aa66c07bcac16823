use crate::state::types::TaskId;

pub const DEFAULT_TASK_NAME: &str = "Unnamed Task";

const FIELD_DELIMITER: char = '|';
const NAME_FIELD: &str = "Name:";
const DATA_FIELD: &str = "Data:";
const SUBTASKS_FIELD: &str = "SubTasks:";
const ACCEPTED_PREFIX: &str = "TASK_ACCEPTED:";

/// Task metadata as sent by an originator.
///
/// Only lines containing `|` are split into fields; any other line is taken verbatim as
/// the payload. Unknown fields (such as a client-side `TaskID:`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub name: String,
    pub data: String,
    /// `None` when the field is missing or not a number.
    pub subtasks: Option<usize>,
}

impl SubmissionRequest {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);

        let mut request = SubmissionRequest {
            name: DEFAULT_TASK_NAME.to_string(),
            data: line.to_string(),
            subtasks: None,
        };

        if !line.contains(FIELD_DELIMITER) {
            return request;
        }

        for part in line.split(FIELD_DELIMITER).map(str::trim) {
            if let Some(name) = part.strip_prefix(NAME_FIELD) {
                request.name = name.trim().to_string();
            } else if let Some(data) = part.strip_prefix(DATA_FIELD) {
                request.data = data.trim().to_string();
            } else if let Some(count) = part.strip_prefix(SUBTASKS_FIELD) {
                match count.trim().parse::<usize>() {
                    Ok(count) => request.subtasks = Some(count),
                    Err(_) => {
                        tracing::warn!("Invalid sub-task count {:?}, using default", count.trim());
                    }
                }
            }
        }

        request
    }

    /// The requested sub-task count, or `default` when none was given.
    pub fn subtasks_or(&self, default: usize) -> usize {
        self.subtasks.unwrap_or(default)
    }
}

pub fn encode_accepted(task_id: TaskId) -> String {
    format!("{}{}\n", ACCEPTED_PREFIX, task_id)
}

/// Extracts the id from a `TASK_ACCEPTED:<id>` reply.
pub fn parse_accepted(line: &str) -> Option<TaskId> {
    line.trim().strip_prefix(ACCEPTED_PREFIX)?.parse().ok()
}
