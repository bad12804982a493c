//! REGIA-RI: Regulatory Event & Guidance Intelligence Architecture.
//!
//! Embeddable regulatory-intelligence platform: pluggable source polling,
//! multi-phase change detection, an indexed knowledge base and an
//! asynchronous event bus. There is no CLI; callers wire the pieces through
//! [`regia_core::RegiaSettings`] and the component constructors.

pub use regia_core as core;
pub use regia_detector as detector;
pub use regia_events as events;
pub use regia_http as http;
pub use regia_kb as kb;
pub use regia_monitor as monitor;
pub use regia_parser as parser;
pub use regia_sources as sources;

pub use regia_core::{RegiaError, RegiaResult, RegiaSettings, RegulatoryChange};
pub use regia_detector::ChangeDetector;
pub use regia_events::{Event, EventBus, EventCategory, EventPriority};
pub use regia_http::HttpClient;
pub use regia_kb::RegulatoryKnowledgeBase;
pub use regia_monitor::{MonitoringStatus, RegulatoryMonitor};
pub use regia_parser::DocumentParser;
pub use regia_sources::{RegulatorySource, RegulatorySourceKind};
