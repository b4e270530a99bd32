use std::collections::{BTreeSet, HashSet};

use super::topic_filter::{TopicFilter, matches};
use super::topic_matcher::{TopicMatcherError, TopicMatcherNode};
use super::topic_path::TopicPath;

type Index = TopicMatcherNode<HashSet<usize>>;

fn filter(pattern: &str) -> TopicFilter {
	TopicFilter::new(pattern).unwrap()
}

fn build_index(subscriptions: &[(&str, usize)]) -> Index {
	let mut root = Index::new();
	for (pattern, id) in subscriptions {
		root.entry(&filter(pattern)).insert(*id);
	}
	root
}

fn matching_ids(root: &Index, topic: &str) -> HashSet<usize> {
	root.find_by_path(&TopicPath::new(topic))
		.into_iter()
		.flat_map(|ids| ids.iter().copied())
		.collect()
}

// Checks every topic against the expected set of subscription ids
fn check_matches(
	subscriptions: &[(&str, usize)],
	expected_matches: &[(&str, Vec<usize>)],
) {
	let root = build_index(subscriptions);

	for (topic, expected_ids) in expected_matches {
		let expected: HashSet<usize> = expected_ids.iter().copied().collect();
		let actual = matching_ids(&root, topic);
		assert_eq!(
			actual, expected,
			"Topic '{}' matched {:?}, expected {:?}",
			topic, actual, expected
		);
	}
}

#[test]
fn test_exact_matches() {
	let subscriptions = [
		("sensors/temperature", 1),
		("sensors/humidity", 2),
		("devices/light/status", 3),
	];

	let expected_matches = [
		("sensors/temperature", vec![1]),
		("sensors/humidity", vec![2]),
		("devices/light/status", vec![3]),
		("sensors/pressure", vec![]),
	];

	check_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_plus_wildcards() {
	let subscriptions = [
		("sensors/+/reading", 1),
		("devices/+/+/state", 2),
		("home/+", 3),
	];

	let expected_matches = [
		("sensors/temperature/reading", vec![1]),
		("sensors/humidity/reading", vec![1]),
		("sensors/temperature/value", vec![]),
		("devices/light/kitchen/state", vec![2]),
		("devices/light/state", vec![]),
		("home/kitchen", vec![3]),
		("home", vec![]),
		("home/kitchen/temperature", vec![]),
	];

	check_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_hash_wildcards() {
	let subscriptions = [("sensors/#", 1), ("home/livingroom/#", 2), ("#", 3)];

	let expected_matches = [
		("sensors", vec![1, 3]),
		("sensors/temperature", vec![1, 3]),
		("sensors/kitchen/temperature", vec![1, 3]),
		("home/livingroom", vec![2, 3]),
		("home/livingroom/light", vec![2, 3]),
		("home/kitchen", vec![3]),
	];

	check_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_complex_subscriptions() {
	let subscriptions = [
		("home/kitchen/temperature", 1),
		("home/+/temperature", 2),
		("home/kitchen/+", 3),
		("home/#", 4),
		("+/kitchen/#", 5),
	];

	let expected_matches = [
		("home/kitchen/temperature", vec![1, 2, 3, 4, 5]),
		("home/livingroom/temperature", vec![2, 4]),
		("home/kitchen/humidity", vec![3, 4, 5]),
		("home/kitchen/temperature/celsius", vec![4, 5]),
		("office/kitchen/temperature", vec![5]),
		("home", vec![4]),
	];

	check_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_edge_cases() {
	let subscriptions = [("#", 2), ("+", 3), ("+/+", 4), ("+/#", 5)];

	let expected_matches = [
		("segment", vec![2, 3, 5]),
		("segment1/segment2", vec![2, 4, 5]),
		("segment1/segment2/segment3", vec![2, 5]),
		("/", vec![2, 4, 5]),
	];

	check_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_reserved_topics_skip_root_wildcards() {
	let subscriptions = [
		("#", 1),
		("+/broker/uptime", 2),
		("$SYS/#", 3),
		("$SYS/+/uptime", 4),
	];

	let expected_matches = [
		("$SYS/broker/uptime", vec![3, 4]),
		("$SYS", vec![3]),
		("broker/broker/uptime", vec![1, 2]),
	];

	check_matches(&subscriptions, &expected_matches);
}

#[test]
fn test_multiple_subscribers_to_same_filter() {
	let mut root = Index::new();
	let pattern = filter("sensors/temperature");

	let ids = root.entry(&pattern);
	ids.insert(1);
	ids.insert(2);

	let found = root.find_by_path(&TopicPath::new("sensors/temperature"));
	assert_eq!(found.len(), 1);
	assert_eq!(*found[0], HashSet::from([1, 2]));
}

#[test]
fn test_update_prunes_empty_nodes() {
	let mut root = build_index(&[("a/+/c", 1), ("a/#", 2), ("x", 3)]);

	let emptied = root.update(&filter("a/+/c"), |ids| {
		ids.remove(&1);
	});
	assert_eq!(emptied, Ok(false));
	assert_eq!(matching_ids(&root, "a/b/c"), HashSet::from([2]));

	root.update(&filter("a/#"), |ids| {
		ids.remove(&2);
	})
	.unwrap();
	let emptied = root.update(&filter("x"), |ids| {
		ids.remove(&3);
	});
	assert_eq!(emptied, Ok(true));
	assert!(root.is_empty());
}

#[test]
fn test_update_keeps_shared_slots() {
	let mut root = build_index(&[("a/b", 1), ("a/b", 2)]);

	root.update(&filter("a/b"), |ids| {
		ids.remove(&1);
	})
	.unwrap();

	assert_eq!(matching_ids(&root, "a/b"), HashSet::from([2]));
	assert!(!root.is_empty());
}

#[test]
fn test_update_unknown_filter() {
	let mut root = build_index(&[("a/b", 1)]);

	let result = root.update(&filter("a/c"), |ids| {
		ids.clear();
	});
	assert_eq!(result, Err(TopicMatcherError::unknown_filter("c", 1)));

	let result = root.update(&filter("a/#"), |ids| {
		ids.clear();
	});
	assert_eq!(result, Err(TopicMatcherError::unknown_filter("#", 1)));
	assert_eq!(matching_ids(&root, "a/b"), HashSet::from([1]));
}

#[test]
fn test_btree_slots() {
	let mut root = TopicMatcherNode::<BTreeSet<u64>>::new();
	root.entry(&filter("a/+")).insert(7);
	root.entry(&filter("a/+")).insert(3);

	let found = root.find_by_path(&TopicPath::new("a/z"));
	let ids: Vec<u64> = found.into_iter().flatten().copied().collect();
	assert_eq!(ids, vec![3, 7]);
}

#[test]
fn test_index_agrees_with_matches() {
	let patterns = [
		"#", "+", "a", "a/b", "a/+", "a/#", "+/b", "+/+", "+/#", "a/+/c",
		"$SYS/#", "$SYS/+", "/", "+/",
	];
	let topics = [
		"a", "b", "a/b", "a/c", "a/b/c", "$SYS", "$SYS/b", "/", "a/", "x/b",
	];

	let subscriptions: Vec<(&str, usize)> =
		patterns.iter().copied().zip(0 ..).collect();
	let root = build_index(&subscriptions);

	for topic in topics {
		let expected: HashSet<usize> = subscriptions
			.iter()
			.filter(|(pattern, _)| matches(pattern, topic))
			.map(|(_, id)| *id)
			.collect();
		assert_eq!(matching_ids(&root, topic), expected, "topic '{topic}'");
	}
}
