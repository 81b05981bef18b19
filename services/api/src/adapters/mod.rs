pub mod db;
pub mod extraction_llm;
pub mod memory;
pub mod storage;
pub mod vision_ocr;

pub use db::DbAdapter;
pub use extraction_llm::OpenAiExtractionAdapter;
pub use memory::InMemoryStore;
pub use storage::LocalObjectStorage;
pub use vision_ocr::GoogleVisionOcrAdapter;
