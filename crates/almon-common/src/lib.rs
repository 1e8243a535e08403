//! Shared data model for the alarm monitor: alarm events, contacts,
//! credentials, and the raw upstream event shape, plus the Snowflake ID
//! generator used for primary keys.

pub mod id;
pub mod types;
