// ============================================================================
// Order Validation Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Required field is empty: {0}")]
    MissingField(&'static str),

    #[error("Malformed email address: {0:?}")]
    InvalidEmail(String),

    #[error("Field must not be negative: {field} = {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Item {index}: catalog id must be positive, got {chrt_id}")]
    InvalidCatalogId { index: usize, chrt_id: i32 },

    #[error("Item {index}: catalog id {chrt_id} already used by an earlier item")]
    DuplicateCatalogId { index: usize, chrt_id: i32 },

    #[error("Item {index}: required field is empty: {field}")]
    ItemMissingField { index: usize, field: &'static str },

    #[error("Item {index}: field must not be negative: {field} = {value}")]
    ItemNegative { index: usize, field: &'static str, value: i64 },
}
