pub mod filter;

pub use filter::{
    DateRange, Filter, FilterCompiler, SearchFilters, Sort, SortOrder, StatusId,
};
