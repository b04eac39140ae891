pub mod cleaner;
pub mod diffbot;
pub mod fetcher;
mod http;
pub mod llm;
pub mod providers;
pub mod readable;

pub use cleaner::HtmdCleaner;
pub use diffbot::DiffbotExtractor;
pub use fetcher::ReqwestFetcher;
pub use llm::OpenAiChatModel;
pub use providers::{EventRegistryProvider, ExaProvider};
pub use readable::ReadableExtractor;
