use std::collections::BTreeMap;

use crate::entities::vote;

pub const VALUE_TYPE_PERCENT: &str = "percent";
pub const VALUE_TYPE_POINTS: &str = "points";
pub const VALUE_TYPE_OPTION: &str = "option";

pub const FUNCTION_COUNT: &str = "count";
pub const FUNCTION_AVERAGE: &str = "average";
pub const FUNCTION_SUM: &str = "sum";

/// Function name under which an option tally is cached, e.g. `option-3`.
pub fn option_function_name(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("option-{}", value as i64)
    } else {
        format!("option-{value}")
    }
}

/// Working set of computed aggregates, ordered tag then value type then
/// function name. This is the structure alteration hooks mutate before the
/// engine flattens it into cached result rows.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResultSet {
    groups: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, tag: &str, value_type: &str, function: &str, value: f64) {
        assert!(!tag.is_empty(), "Result tag cannot be empty");
        assert!(!value_type.is_empty(), "Result value type cannot be empty");
        assert!(!function.is_empty(), "Result function cannot be empty");
        self.groups
            .entry(tag.to_string())
            .or_default()
            .entry(value_type.to_string())
            .or_default()
            .insert(function.to_string(), value);
    }

    pub fn get(&self, tag: &str, value_type: &str, function: &str) -> Option<f64> {
        self.groups
            .get(tag)
            .and_then(|types| types.get(value_type))
            .and_then(|functions| functions.get(function))
            .copied()
    }

    /// Removes a single computed function, pruning emptied groups so they
    /// never flatten into rows.
    pub fn remove(&mut self, tag: &str, value_type: &str, function: &str) -> Option<f64> {
        let types = self.groups.get_mut(tag)?;
        let functions = types.get_mut(value_type)?;
        let removed = functions.remove(function);
        if functions.is_empty() {
            types.remove(value_type);
        }
        if types.is_empty() {
            self.groups.remove(tag);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Flattened view in deterministic (tag, value_type, function) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str, f64)> {
        self.groups.iter().flat_map(|(tag, types)| {
            types.iter().flat_map(move |(value_type, functions)| {
                functions.iter().map(move |(function, value)| {
                    (
                        tag.as_str(),
                        value_type.as_str(),
                        function.as_str(),
                        *value,
                    )
                })
            })
        })
    }
}

/// Votes for one target, grouped by tag then value type. Ordering is
/// deterministic so built-ins and extensions always run in the same order.
pub type GroupedVotes<'a> = BTreeMap<(String, String), Vec<&'a vote::Model>>;

pub fn group_votes(votes: &[vote::Model]) -> GroupedVotes<'_> {
    let mut groups: GroupedVotes<'_> = BTreeMap::new();
    for vote in votes {
        groups
            .entry((vote.tag.clone(), vote.value_type.clone()))
            .or_default()
            .push(vote);
    }
    groups
}

/// Computes the standard results for every (tag, value_type) group.
///
/// "percent" and "points" groups get `count` and `average`; "points"
/// additionally gets `sum`. "option" groups get one `option-<value>` count
/// per distinct value. Other value types produce no built-in results; they
/// are served exclusively by registered extension functions. Empty groups
/// cannot occur, so the average division is always defined.
pub fn compute_builtin_results(groups: &GroupedVotes<'_>) -> ResultSet {
    let mut results = ResultSet::new();

    for ((tag, value_type), votes) in groups {
        assert!(!votes.is_empty(), "Vote group cannot be empty");

        if value_type == VALUE_TYPE_OPTION {
            let mut tallies: BTreeMap<String, f64> = BTreeMap::new();
            for vote in votes {
                *tallies.entry(option_function_name(vote.value)).or_insert(0.0) += 1.0;
            }
            for (function, count) in tallies {
                results.set(tag, value_type, &function, count);
            }
            continue;
        }

        if value_type != VALUE_TYPE_PERCENT && value_type != VALUE_TYPE_POINTS {
            continue;
        }

        let count = votes.len() as f64;
        let sum: f64 = votes.iter().map(|vote| vote.value).sum();
        results.set(tag, value_type, FUNCTION_COUNT, count);
        results.set(tag, value_type, FUNCTION_AVERAGE, sum / count);
        if value_type == VALUE_TYPE_POINTS {
            results.set(tag, value_type, FUNCTION_SUM, sum);
        }
    }

    results
}

/// A named aggregation function contributed by an external collaborator.
pub trait ResultFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Computes the aggregate over one (tag, value_type) group of votes.
    /// The group is never empty.
    fn calculate(&self, votes: &[&vote::Model]) -> f64;
}

struct Registration {
    /// Restricts the function to one tag; `None` applies it to every tag.
    tag: Option<String>,
    value_type: String,
    function: Box<dyn ResultFunction>,
}

/// Extension functions keyed by (tag, value_type), populated once at
/// construction and read-only afterwards.
#[derive(Default)]
pub struct FunctionRegistry {
    registrations: Vec<Registration>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        tag: Option<&str>,
        value_type: &str,
        function: Box<dyn ResultFunction>,
    ) {
        assert!(!value_type.is_empty(), "Registration value type required");
        assert!(
            !function.name().is_empty(),
            "Registered function must be named"
        );
        self.registrations.push(Registration {
            tag: tag.map(str::to_string),
            value_type: value_type.to_string(),
            function,
        });
    }

    /// Runs every registered function against its matching groups, after the
    /// built-ins, writing into the shared working set. Registration order is
    /// invocation order.
    pub fn apply(&self, results: &mut ResultSet, groups: &GroupedVotes<'_>) {
        for registration in &self.registrations {
            for ((tag, value_type), votes) in groups {
                if *value_type != registration.value_type {
                    continue;
                }
                if let Some(scoped_tag) = &registration.tag {
                    if scoped_tag != tag {
                        continue;
                    }
                }
                let value = registration.function.calculate(votes);
                results.set(tag, value_type, registration.function.name(), value);
            }
        }
    }
}
