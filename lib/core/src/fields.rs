//! Well-known workitem field names.
//!
//! Names are stored lowercase; [`Workitem`](crate::Workitem) lowercases every
//! name it is given, so `$taskID` and `$taskid` address the same item.

pub const UNIQUE_ID: &str = "$uniqueid";
pub const UNIQUE_ID_SOURCE: &str = "$uniqueidsource";
pub const UNIQUE_ID_VERSIONS: &str = "$uniqueidversions";
pub const WORKITEM_ID: &str = "$workitemid";
pub const TRANSACTION_ID: &str = "$transactionid";
pub const MODEL_VERSION: &str = "$modelversion";
pub const WORKFLOW_GROUP: &str = "$workflowgroup";
pub const WORKFLOW_STATUS: &str = "$workflowstatus";
pub const TASK_ID: &str = "$taskid";
pub const EVENT_ID: &str = "$eventid";
pub const ACTIVITY_ID_LIST: &str = "$activityidlist";
pub const RUNS: &str = "$runs";
pub const EVENT_LOG: &str = "$eventlog";
pub const EVENT_LOG_COMMENT: &str = "$eventlogcomment";
pub const LAST_TASK: &str = "$lasttask";
pub const LAST_EVENT: &str = "$lastevent";
pub const LAST_EVENT_DATE: &str = "$lasteventdate";
pub const IS_VERSION: &str = "$isversion";
pub const TYPE: &str = "type";

/// Field names from the previous naming generation.
///
/// Stored workitems may still carry these; readers fall back to them and the
/// kernel keeps them in sync on write unless configured otherwise.
pub mod legacy {
    pub const PROCESS_ID: &str = "$processid";
    pub const ACTIVITY_ID: &str = "$activityid";
    pub const EVENT_LOG: &str = "txtworkflowactivitylog";
    pub const EVENT_LOG_COMMENT: &str = "txtworkflowactivitylogcomment";
    pub const LAST_ACTIVITY_ID: &str = "numlastactivityid";
    pub const WORKFLOW_STATUS: &str = "txtworkflowstatus";
    pub const WORKFLOW_GROUP: &str = "txtworkflowgroup";
}
