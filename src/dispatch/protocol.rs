use crate::state::types::{SubtaskId, TaskId};

const TASK_PREFIX: &str = "TASK";
const SUBTASK_TAG: &str = "SUBTASK";
const ACK_PREFIX: &str = "ACK";

/// Splits `data` into `count` labeled partitions: `SubTask-<i>/<n>: <data> [Partition <i>]`.
///
/// Every partition carries the whole payload; the label tells a worker which slice it owns.
pub fn partition_payload(data: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("SubTask-{}/{}: {} [Partition {}]", i, count, data, i))
        .collect()
}

/// `TASK:<taskId>:SUBTASK:<subId>:<partition>\n`
pub fn encode_subtask(task_id: TaskId, subtask_id: SubtaskId, partition: &str) -> String {
    format!(
        "{}:{}:{}:{}:{}\n",
        TASK_PREFIX, task_id, SUBTASK_TAG, subtask_id, partition
    )
}

/// Any response line starting with `ACK` counts as acceptance.
pub fn is_ack(response: &str) -> bool {
    response.starts_with(ACK_PREFIX)
}
