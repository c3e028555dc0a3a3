//! The memoized computation graph.
//!
//! A forecasting function is registered as a [`CalcNodeDef`]: a key, the
//! variable names it reads, the dataset keys it fetches, the upstream calcs
//! it calls, and the function itself. Registration is eager about mistakes:
//! an unknown variable name or an unregistered upstream panics immediately,
//! not at call time.
//!
//! A [`ScenarioSession`] owns the per-session state: variable overrides, the
//! dataset cache and the result cache. Results are cached under a key
//! derived from the function identity XORed with all transitive upstream
//! identities, combined with a JSON snapshot of every variable in the
//! transitive closure. Changing any input variable therefore changes the
//! key; unchanged inputs hit the cache without re-invoking the body or
//! re-fetching datasets.
//!
//! Only no-argument top-level forecasts are registered here. Helpers that
//! take explicit arguments stay ordinary functions: their results depend on
//! caller-supplied state the cache key cannot see, so they must not be
//! cached at this level (their callers' dataset fetches still are).
//!
//! Sessions are deliberately single-threaded (`RefCell`, not locks): each
//! request owns its session, and the cache key being a pure function of the
//! inputs is what keeps caching sound without locking.

use crate::datasets::{DataTable, DatasetCache, DatasetStore};
use crate::errors::ScenarioResult;
use crate::series::{Year, YearSeries};
use crate::variables::{self, ScenarioVariables, VariableValue};
use indexmap::IndexMap;
use log::debug;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A registered forecasting function.
///
/// The context argument exposes exactly the declared dependencies; accessing
/// anything undeclared panics.
pub type CalcFn = fn(&CalcContext) -> ScenarioResult<YearSeries>;

/// Dependency declaration for one forecasting function.
pub struct CalcNodeDef {
    /// Stable identity of the function, used in cache keys.
    pub key: &'static str,
    /// Variable names read from the variable store.
    pub variables: &'static [&'static str],
    /// Dataset keys fetched from the dataset provider.
    pub datasets: &'static [&'static str],
    /// Keys of other registered calcs this one calls.
    pub upstreams: &'static [&'static str],
    pub func: CalcFn,
}

/// Collects node definitions and validates them eagerly.
///
/// Upstreams must be registered before their dependents, which also rules
/// out dependency cycles by construction.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: IndexMap<&'static str, CalcNodeDef>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: CalcNodeDef) -> &mut Self {
        assert!(
            !self.nodes.contains_key(def.key),
            "calc '{}' registered twice",
            def.key
        );
        for name in def.variables {
            assert!(
                variables::is_registered(name),
                "calc '{}' declares unknown variable '{}'",
                def.key,
                name
            );
        }
        for upstream in def.upstreams {
            assert!(
                self.nodes.contains_key(upstream),
                "calc '{}' depends on unregistered calc '{}'",
                def.key,
                upstream
            );
        }
        self.nodes.insert(def.key, def);
        self
    }

    /// Finalize the graph: build the dependency graph, check it is acyclic
    /// and precompute the transitive variable/upstream closures every cache
    /// key needs.
    pub fn build(self) -> CalcGraph {
        let mut graph: DiGraph<&'static str, ()> = DiGraph::new();
        let mut indices: HashMap<&'static str, NodeIndex> = HashMap::new();
        for (&key, _) in &self.nodes {
            indices.insert(key, graph.add_node(key));
        }
        for (&key, def) in &self.nodes {
            for &upstream in def.upstreams {
                graph.add_edge(indices[upstream], indices[key], ());
            }
        }
        assert!(!is_cyclic_directed(&graph), "calc graph contains a cycle");

        // Registration order is upstream-first, so a single in-order pass
        // sees every upstream closure before it is needed.
        let mut var_closures: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
        let mut upstream_closures: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
        for (&key, def) in &self.nodes {
            let mut vars: BTreeSet<&'static str> = def.variables.iter().copied().collect();
            let mut upstreams: BTreeSet<&'static str> = def.upstreams.iter().copied().collect();
            for &upstream in def.upstreams {
                vars.extend(var_closures[upstream].iter().copied());
                upstreams.extend(upstream_closures[upstream].iter().copied());
            }
            var_closures.insert(key, vars.into_iter().collect());
            upstream_closures.insert(key, upstreams.into_iter().collect());
        }

        CalcGraph {
            nodes: self.nodes,
            var_closures,
            upstream_closures,
        }
    }
}

/// The finalized computation graph: node definitions plus their transitive
/// dependency closures.
pub struct CalcGraph {
    nodes: IndexMap<&'static str, CalcNodeDef>,
    var_closures: HashMap<&'static str, Vec<&'static str>>,
    upstream_closures: HashMap<&'static str, Vec<&'static str>>,
}

impl CalcGraph {
    pub fn node(&self, key: &str) -> &CalcNodeDef {
        self.nodes
            .get(key)
            .unwrap_or_else(|| panic!("no calc registered under '{}'", key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.nodes.keys().copied()
    }

    /// Union of the node's own variables and all transitive upstreams'.
    pub fn variable_closure(&self, key: &str) -> &[&'static str] {
        self.var_closures
            .get(key)
            .unwrap_or_else(|| panic!("no calc registered under '{}'", key))
    }

    pub fn upstream_closure(&self, key: &str) -> &[&'static str] {
        self.upstream_closures
            .get(key)
            .unwrap_or_else(|| panic!("no calc registered under '{}'", key))
    }
}

fn str_hash(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Per-request scenario state: variable overrides plus the dataset and
/// result caches.
pub struct ScenarioSession {
    graph: Arc<CalcGraph>,
    variables: ScenarioVariables,
    datasets: DatasetCache,
    results: RefCell<HashMap<u64, Arc<YearSeries>>>,
}

impl ScenarioSession {
    pub fn new(graph: Arc<CalcGraph>, store: Arc<dyn DatasetStore>) -> Self {
        Self {
            graph,
            variables: ScenarioVariables::new(),
            datasets: DatasetCache::new(store),
            results: RefCell::new(HashMap::new()),
        }
    }

    pub fn graph(&self) -> &CalcGraph {
        &self.graph
    }

    pub fn variables(&self) -> &ScenarioVariables {
        &self.variables
    }

    /// Override a variable for this session.
    ///
    /// No cache invalidation happens here and none is needed: the new value
    /// lands in the cache-key snapshot of every calc whose closure contains
    /// the variable.
    pub fn set_variable(
        &mut self,
        name: &str,
        value: impl Into<VariableValue>,
    ) -> ScenarioResult<()> {
        self.variables.set(name, value)
    }

    /// Number of cached calc results, for cache-behavior tests.
    pub fn cached_results(&self) -> usize {
        self.results.borrow().len()
    }

    /// Run a registered calc, returning the cached result when its inputs
    /// are unchanged.
    pub fn run(&self, key: &str) -> ScenarioResult<Arc<YearSeries>> {
        let node = self.graph.node(key);
        let cache_key = self.cache_key(key);
        if let Some(hit) = self.results.borrow().get(&cache_key) {
            debug!("calc cache hit: {}", key);
            return Ok(hit.clone());
        }
        debug!("computing calc: {}", key);
        let context = CalcContext {
            session: self,
            node,
        };
        let series = Arc::new((node.func)(&context)?);
        self.results.borrow_mut().insert(cache_key, series.clone());
        Ok(series)
    }

    fn cache_key(&self, key: &str) -> u64 {
        let mut identity = str_hash(key);
        for &upstream in self.graph.upstream_closure(key) {
            identity ^= str_hash(upstream);
        }

        let mut snapshot: BTreeMap<&str, VariableValue> = BTreeMap::new();
        for &name in self.graph.variable_closure(key) {
            snapshot.insert(name, self.variables.get(name));
        }
        let snapshot =
            serde_json::to_string(&snapshot).expect("variable snapshot is serializable");

        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        snapshot.hash(&mut hasher);
        hasher.finish()
    }
}

/// The window a calc body sees: exactly its declared dependencies.
pub struct CalcContext<'a> {
    session: &'a ScenarioSession,
    node: &'a CalcNodeDef,
}

impl CalcContext<'_> {
    /// Resolve a declared variable.
    pub fn var(&self, name: &str) -> VariableValue {
        assert!(
            self.node.variables.iter().any(|v| *v == name),
            "calc '{}' does not declare variable '{}'",
            self.node.key,
            name
        );
        self.session.variables.get(name)
    }

    pub fn var_f64(&self, name: &str) -> f64 {
        self.var(name)
            .as_f64()
            .unwrap_or_else(|| panic!("variable '{}' is not a float", name))
    }

    pub fn var_i64(&self, name: &str) -> i64 {
        self.var(name)
            .as_i64()
            .unwrap_or_else(|| panic!("variable '{}' is not an integer", name))
    }

    /// Integer variable interpreted as a calendar year.
    pub fn var_year(&self, name: &str) -> Year {
        self.var_i64(name) as Year
    }

    pub fn var_str(&self, name: &str) -> String {
        self.var(name)
            .as_str()
            .unwrap_or_else(|| panic!("variable '{}' is not a string", name))
            .to_string()
    }

    pub fn var_map(&self, name: &str) -> BTreeMap<String, f64> {
        self.var(name)
            .as_map()
            .unwrap_or_else(|| panic!("variable '{}' is not a map", name))
            .clone()
    }

    /// Fetch a declared dataset through the dataset cache.
    pub fn dataset(&self, key: &str) -> ScenarioResult<Arc<DataTable>> {
        assert!(
            self.node.datasets.iter().any(|d| *d == key),
            "calc '{}' does not declare dataset '{}'",
            self.node.key,
            key
        );
        self.session.datasets.load(key)
    }

    /// Run a declared upstream calc (through the result cache).
    pub fn upstream(&self, key: &str) -> ScenarioResult<Arc<YearSeries>> {
        assert!(
            self.node.upstreams.iter().any(|u| *u == key),
            "calc '{}' does not declare upstream '{}'",
            self.node.key,
            key
        );
        self.session.run(key)
    }
}
