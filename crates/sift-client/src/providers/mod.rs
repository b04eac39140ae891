pub mod event_registry;
pub mod exa;

pub use event_registry::EventRegistryProvider;
pub use exa::ExaProvider;

/// Provider bodies are cut to this many characters for the snippet.
pub(crate) const SNIPPET_CHARS: usize = 1500;

pub(crate) fn clip(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}
