// Library interface for blogshift modules
// This allows tests and the binary to import modules

pub mod classify;
pub mod dates;
pub mod discover;
pub mod dom;
pub mod extract;
pub mod fetch;
pub mod jsonld;
pub mod llm;
pub mod pipeline;
pub mod publish;
pub mod rank;
pub mod reference;
pub mod render;
pub mod search;
pub mod slug;
pub mod storage;
pub mod throttle;
