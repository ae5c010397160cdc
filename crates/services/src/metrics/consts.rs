// Limit enforcement metrics
pub const METRIC_LIMIT_CHECKS: &str = "mail_admin.limits.checks";
pub const METRIC_LIMIT_EXCEEDED: &str = "mail_admin.limits.exceeded";
pub const METRIC_LIMIT_CHECK_DURATION: &str = "mail_admin.limits.check_duration";

// Synchronization metrics
pub const METRIC_LIMIT_RECORDS_CREATED: &str = "mail_admin.limits.records_created";
pub const METRIC_LIMIT_SYNC_ERRORS: &str = "mail_admin.limits.sync_errors";

// Low-cardinality tags only (NO user/domain ids - those go to the audit trail)
pub const TAG_PRINCIPAL_KIND: &str = "principal_kind";
pub const TAG_RESOURCE_TYPE: &str = "resource_type";
pub const TAG_ERROR_TYPE: &str = "error_type";

// Error types for TAG_ERROR_TYPE
pub const ERROR_TYPE_MISSING_RECORD: &str = "missing_record";
pub const ERROR_TYPE_MISSING_DEFAULT: &str = "missing_default";
pub const ERROR_TYPE_INTERNAL_ERROR: &str = "internal_error";
