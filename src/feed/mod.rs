pub mod sort_filter;
pub mod store;

pub use sort_filter::{
    sort_opportunities, sort_validators, sort_validators_by, OpportunityFilter, PoolSortKey,
    SortDirection, ValidatorFilter, ValidatorSortKey,
};
pub use store::{FeedSnapshot, FeedStore, VALIDATOR_SOURCE};
