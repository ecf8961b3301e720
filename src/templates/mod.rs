//! Embedded templates written by `codeloop init`.

/// Default `codeloop.toml` configuration.
pub(crate) const CODELOOP_TOML: &str = include_str!("codeloop.toml");

/// Sample request for `codeloop solve --request`.
pub(crate) const REQUEST_JSON: &str = include_str!("request.json");
