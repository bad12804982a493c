use crate::event::{Event, EventCategory, EventPriority};

/// Pure, cheap predicate over events; routing assumes no side effects.
pub trait EventFilter: Send + Sync {
    fn matches(&self, event: &Event) -> bool;
}

pub struct CategoryFilter {
    category: EventCategory,
}

impl CategoryFilter {
    pub fn new(category: EventCategory) -> Self {
        Self { category }
    }
}

impl EventFilter for CategoryFilter {
    fn matches(&self, event: &Event) -> bool {
        event.category == self.category
    }
}

pub struct SourceFilter {
    source: String,
}

impl SourceFilter {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl EventFilter for SourceFilter {
    fn matches(&self, event: &Event) -> bool {
        event.source == self.source
    }
}

pub struct PriorityFilter {
    min_priority: EventPriority,
}

impl PriorityFilter {
    pub fn new(min_priority: EventPriority) -> Self {
        Self { min_priority }
    }
}

impl EventFilter for PriorityFilter {
    fn matches(&self, event: &Event) -> bool {
        event.priority >= self.min_priority
    }
}

/// AND-composition of filters; empty composite matches everything.
#[derive(Default)]
pub struct CompositeFilter {
    filters: Vec<Box<dyn EventFilter>>,
}

impl CompositeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, filter: Box<dyn EventFilter>) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn with(mut self, filter: Box<dyn EventFilter>) -> Self {
        self.filters.push(filter);
        self
    }
}

impl EventFilter for CompositeFilter {
    fn matches(&self, event: &Event) -> bool {
        self.filters.iter().all(|filter| filter.matches(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(category: EventCategory, source: &str, priority: EventPriority) -> Event {
        Event::new(category, source, "test", json!({}), priority)
    }

    #[test]
    fn test_category_filter() {
        let filter = CategoryFilter::new(EventCategory::RegulatoryChangeDetected);
        assert!(filter.matches(&event(
            EventCategory::RegulatoryChangeDetected,
            "s",
            EventPriority::Normal
        )));
        assert!(!filter.matches(&event(
            EventCategory::SystemError,
            "s",
            EventPriority::Normal
        )));
    }

    #[test]
    fn test_source_filter() {
        let filter = SourceFilter::new("sec_edgar");
        assert!(filter.matches(&event(
            EventCategory::SystemError,
            "sec_edgar",
            EventPriority::Normal
        )));
        assert!(!filter.matches(&event(
            EventCategory::SystemError,
            "fca",
            EventPriority::Normal
        )));
    }

    #[test]
    fn test_priority_filter_is_minimum() {
        let filter = PriorityFilter::new(EventPriority::High);
        assert!(!filter.matches(&event(
            EventCategory::SystemError,
            "s",
            EventPriority::Low
        )));
        assert!(!filter.matches(&event(
            EventCategory::SystemError,
            "s",
            EventPriority::Normal
        )));
        assert!(filter.matches(&event(
            EventCategory::SystemError,
            "s",
            EventPriority::High
        )));
        assert!(filter.matches(&event(
            EventCategory::SystemError,
            "s",
            EventPriority::Urgent
        )));
    }

    #[test]
    fn test_composite_filter_and_semantics() {
        let composite = CompositeFilter::new()
            .with(Box::new(CategoryFilter::new(
                EventCategory::RegulatoryChangeDetected,
            )))
            .with(Box::new(PriorityFilter::new(EventPriority::High)));

        assert!(composite.matches(&event(
            EventCategory::RegulatoryChangeDetected,
            "s",
            EventPriority::Urgent
        )));
        assert!(!composite.matches(&event(
            EventCategory::RegulatoryChangeDetected,
            "s",
            EventPriority::Low
        )));
        assert!(!composite.matches(&event(
            EventCategory::SystemError,
            "s",
            EventPriority::Urgent
        )));
    }

    #[test]
    fn test_empty_composite_matches_all() {
        let composite = CompositeFilter::new();
        assert!(composite.matches(&event(
            EventCategory::SystemError,
            "s",
            EventPriority::Low
        )));
    }
}
