//! Tool catalog and dispatch for ToolRelay.
//!
//! Remote JSON-RPC providers and the builtin toolsets (skill library,
//! page context) are merged into one aliased [`Catalog`]. The
//! [`ToolDispatcher`] runs model tool calls against it.

pub mod alias;
pub mod cache;
pub mod catalog;
pub mod dispatcher;
pub mod page_context;
pub mod schema;
pub mod skill_library;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use alias::{MAX_ALIAS_LEN, to_tool_alias};
pub use cache::{CATALOG_CACHE_TTL, CatalogCache};
pub use catalog::{AliasedTool, BuildOptions, Catalog, CatalogBuilder, ToolBinding, ToolInvoker};
pub use dispatcher::{Dispatch, ToolDispatcher, render_output};
pub use schema::normalize_schema;
