//! Pure transforms over already-fetched task data: dashboard rollups, the
//! week/date-range filter, the overdue predicate, export flattening and
//! document line extraction. Nothing in here touches the database.

pub mod aggregate;
pub mod export;
pub mod filter;
pub mod import;
pub mod overdue;
