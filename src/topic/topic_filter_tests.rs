//! Tests for filter parsing and the matching rules

use arcstr::Substr;

use super::{
	IntoTopicFilters, TopicFilter, TopicFilterError, TopicFilterItem,
	TopicFilterSet, TopicPath, matches,
};

#[test]
fn test_literal_item() {
	let item = TopicFilterItem::try_from(Substr::from("sensors")).unwrap();

	assert_eq!(item, TopicFilterItem::Literal(Substr::from("sensors")));
	assert_eq!(item.as_str(), "sensors");
	assert!(!item.is_wildcard());
}

#[test]
fn test_wildcard_items() {
	let plus = TopicFilterItem::try_from(Substr::from("+")).unwrap();
	let hash = TopicFilterItem::try_from(Substr::from("#")).unwrap();

	assert_eq!(plus, TopicFilterItem::SingleLevel);
	assert_eq!(hash, TopicFilterItem::MultiLevel);
	assert!(plus.is_wildcard());
	assert!(hash.is_wildcard());
}

#[test]
fn test_wildcard_inside_level_is_rejected() {
	for level in ["a+", "+a", "b#", "#b", "x+y"] {
		let err = TopicFilterItem::try_from(Substr::from(level)).unwrap_err();
		assert_eq!(err, TopicFilterError::wildcard_usage(level));
	}
}

#[test]
fn test_filter_parsing() {
	let filter = TopicFilter::new("sensors/+/temp").unwrap();

	assert_eq!(filter.as_str(), "sensors/+/temp");
	assert_eq!(filter.segments().len(), 3);
	assert_eq!(filter.segments()[1], TopicFilterItem::SingleLevel);
	assert!(filter.has_wildcards());
	assert!(!TopicFilter::new("a/b").unwrap().has_wildcards());
}

#[test]
fn test_invalid_filters() {
	assert_eq!(TopicFilter::new(""), Err(TopicFilterError::EmptyFilter));
	assert_eq!(
		TopicFilter::new("a/#/b"),
		Err(TopicFilterError::hash_position("a/#/b"))
	);
	assert_eq!(
		TopicFilter::new("a/b+"),
		Err(TopicFilterError::wildcard_usage("b+"))
	);
	assert_eq!(
		TopicFilter::new("a/\0"),
		Err(TopicFilterError::NullCharacter)
	);

	let long = "a".repeat(65536);
	assert!(matches!(
		TopicFilter::new(long),
		Err(TopicFilterError::TooLong { len: 65536, .. })
	));
}

#[test]
fn test_empty_levels_are_literals() {
	let filter = TopicFilter::new("/a//b/").unwrap();
	assert_eq!(filter.segments().len(), 5);
	assert!(filter.matches_topic("/a//b/"));
	assert!(!filter.matches_topic("a/b"));
}

#[test]
fn test_documented_examples() {
	assert!(matches("a/+/c", "a/b/c"));
	assert!(!matches("a/+/c", "a/b/x/c"));
	assert!(matches("a/#", "a/b/c"));
	assert!(matches("a/#", "a"));
	assert!(!matches("+/b", "$SYS/b"));
}

#[test]
fn test_reserved_topics() {
	assert!(!matches("#", "$SYS/broker/uptime"));
	assert!(!matches("+/broker/uptime", "$SYS/broker/uptime"));
	assert!(matches("$SYS/#", "$SYS/broker/uptime"));
	assert!(matches("$SYS/+/uptime", "$SYS/broker/uptime"));
	// Only the first level is protected
	assert!(matches("a/+", "a/$b"));
	assert!(matches("a/#", "a/$b/c"));
}

#[test]
fn test_invalid_filters_never_match() {
	assert!(!matches("a/#/c", "a/b/c"));
	assert!(!matches("a+", "a+"));
	assert!(!matches("", ""));
	assert!(!matches("a", ""));
}

#[test]
fn test_length_rules() {
	assert!(!matches("a/b", "a/b/c"));
	assert!(!matches("a/b/c", "a/b"));
	assert!(!matches("a/+", "a"));
	assert!(!matches("a/+/#", "a"));
	assert!(matches("a/+/#", "a/b"));
	assert!(matches("+/#", "a"));
	assert!(matches("#", "a/b/c"));
	assert!(matches("+", "a"));
	assert!(!matches("+", "a/b"));
}

#[test]
fn test_parsed_and_raw_matching_agree() {
	let filters = [
		"#",
		"+",
		"a",
		"a/b",
		"a/+",
		"a/#",
		"+/b",
		"+/+",
		"+/#",
		"a/+/c",
		"a/+/#",
		"$SYS/#",
		"$SYS/+",
		"/a",
		"a/",
		"+/",
	];
	let topics = [
		"a",
		"b",
		"a/b",
		"a/c",
		"a/b/c",
		"a/b/x/c",
		"$SYS",
		"$SYS/b",
		"$SYS/b/c",
		"/a",
		"a/",
		"/",
		"x/b",
	];

	for filter in filters {
		let parsed = TopicFilter::new(filter).unwrap();
		for topic in topics {
			assert_eq!(
				parsed.matches(&TopicPath::new(topic)),
				matches(filter, topic),
				"filter '{filter}' topic '{topic}'"
			);
		}
	}
}

#[test]
fn test_matching_is_repeatable() {
	let filter = TopicFilter::new("sensors/+/temp").unwrap();
	let topic = TopicPath::new("sensors/7/temp");
	let first = filter.matches(&topic);
	for _ in 0 .. 10 {
		assert_eq!(filter.matches(&topic), first);
		assert_eq!(matches("sensors/+/temp", "sensors/7/temp"), first);
	}
}

#[test]
fn test_filter_set_deduplicates_and_keeps_order() {
	let set = vec!["b/#", "a/+", "b/#"].into_topic_filters().unwrap();

	let filters: Vec<&str> = set.iter().map(TopicFilter::as_str).collect();
	assert_eq!(filters, vec!["b/#", "a/+"]);
	assert!(set.matches(&TopicPath::new("a/x")));
	assert!(set.matches(&TopicPath::new("b")));
	assert!(!set.matches(&TopicPath::new("c")));
}

#[test]
fn test_filter_set_errors() {
	let empty: Vec<&str> = Vec::new();
	assert_eq!(empty.into_topic_filters(), Err(TopicFilterError::NoFilters));
	assert_eq!(
		["ok/+", "bad/#/x"].into_topic_filters(),
		Err(TopicFilterError::hash_position("bad/#/x"))
	);
	assert_eq!(
		TopicFilterSet::new(Vec::new()),
		Err(TopicFilterError::NoFilters)
	);
}

#[test]
fn test_into_topic_filters_variants() {
	assert_eq!("a/b".into_topic_filters().unwrap().len(), 1);
	assert_eq!(String::from("a/b").into_topic_filters().unwrap().len(), 1);
	let slice: &[&str] = &["a", "b"];
	assert_eq!(slice.into_topic_filters().unwrap().len(), 2);
	let parsed = TopicFilter::new("a/+").unwrap();
	assert_eq!(parsed.into_topic_filters().unwrap().len(), 1);
}
