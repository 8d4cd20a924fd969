//! Interpreter-side measurement library.
//!
//! This is the companion code prepended to every submission before it is
//! executed. The names and byte constants here must stay in step with the
//! native model in [`crate::runtime::tracker`].

use crate::runtime::tracker::{CONTAINER_BASE_BYTES, SLOT_BYTES};

/// Name of the shared counter mapping inside the script.
///
/// Dunder names are exempt from class-private name mangling, so injected
/// increments inside method bodies still reach the module-level mapping.
pub const TRACKER_NAME: &str = "__tracker__";

/// Name of the memory-delta helper.
pub const MEM_HELPER_NAME: &str = "__track_mem__";

/// Name of the tracked container type substituted for list literals.
pub const TRACKED_LIST_TYPE: &str = "TrackedList";

/// Statement that creates a fresh TrackerState for one execution.
pub fn tracker_init_line() -> String {
    format!(r#"{TRACKER_NAME} = {{"ops": 0, "current_mem": 0, "peak_mem": 0}}"#)
}

/// Statement injected into every countable block body (without indentation).
pub fn ops_increment_statement() -> String {
    format!("{TRACKER_NAME}['ops'] += 1")
}

/// The library text itself.
pub fn library_source() -> String {
    format!(
        r#"def {helper}(delta):
    {tracker}['current_mem'] += delta
    if {tracker}['current_mem'] > {tracker}['peak_mem']:
        {tracker}['peak_mem'] = {tracker}['current_mem']

class {list_type}(list):
    def __init__(self, *args):
        super().__init__(*args)
        self._size = {base} + len(self) * {slot}
        {helper}(self._size)

    def append(self, item):
        super().append(item)
        self._size += {slot}
        {helper}({slot})

    def pop(self, index=-1):
        # Charged only after a successful pop; a failed pop(index) frees nothing.
        if len(self) > 0:
            item = super().pop(index)
            self._size -= {slot}
            {helper}(-{slot})
            return item
        return super().pop(index)

    def clear(self):
        freed = len(self) * {slot}
        super().clear()
        self._size -= freed
        {helper}(-freed)
"#,
        helper = MEM_HELPER_NAME,
        tracker = TRACKER_NAME,
        list_type = TRACKED_LIST_TYPE,
        base = CONTAINER_BASE_BYTES,
        slot = SLOT_BYTES,
    )
}
