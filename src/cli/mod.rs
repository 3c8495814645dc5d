pub mod annotate;
pub mod console;
pub mod doctor;
pub mod preview;
pub mod report;

pub use annotate::annotate_detections;
pub use console::ConsoleObserver;
pub use doctor::{run_checks, DoctorReport};
pub use preview::{spawn_key_listener, AsciiRenderer, KeyAction, PreviewTerminal};
pub use report::{export_embeddings_csv, similarity_report, write_similarity_report};
