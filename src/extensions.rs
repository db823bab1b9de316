//! Pluggable engine extensions and their binding to per-job results.
//!
//! The host names each extension by class and ships JSON constructor
//! parameters plus optional serialized state. Construction goes through an
//! explicit, injectable registry. After construction, each object is
//! offered two independent statistics channels into the in-progress result:
//! a per-subjob channel addressed by the index the engine assigns, and a
//! whole-job aggregate channel. An extension that implements neither simply
//! has no statistics channel; that is not an error.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::{
    protocol::{CompactionRequest, PluginSpec},
    stats::{ExtensionCounters, StatsHub, SubjobSlots},
};

/// Errors from extension construction and state restore.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// No factory is registered for the class.
    #[error("unknown extension class '{0}'")]
    UnknownClass(String),
    /// The constructor parameters are not valid JSON.
    #[error("bad constructor params for '{class}': {source}")]
    BadParams {
        /// Class whose parameters failed to parse.
        class: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// The serialized prior state does not restore into the object.
    #[error("malformed serialized state for '{0}'")]
    BadState(String),
    /// The factory rejected the parameters.
    #[error("extension construction failed for '{class}': {reason}")]
    Construct {
        /// Class that failed to construct.
        class: String,
        /// Factory-reported reason.
        reason: String,
    },
}

/// Role an extension fills in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionRole {
    /// User key ordering.
    Comparator,
    /// Merge-operand combination.
    MergeOperator,
    /// Per-entry filtering during the merge.
    CompactionFilterFactory,
    /// Output file storage format.
    TableFactory,
    /// Key-prefix extraction.
    PrefixExtractor,
    /// Output-file cut points.
    PartitionerFactory,
}

/// Per-subjob statistics channel.
///
/// Writes target the slot matching the subjob index the engine assigns;
/// slots are disjoint, so no locking is needed at that granularity.
pub trait SubjobStatsSink: Send + Sync {
    /// Hand the extension the pre-sized slot array for this job.
    fn bind_subjobs(&self, slots: Arc<SubjobSlots>);
}

/// Whole-job aggregate statistics channel.
pub trait AggregateStatsSink: Send + Sync {
    /// Hand the extension the job's aggregate counters.
    fn bind_aggregate(&self, counters: Arc<ExtensionCounters>);
}

/// Base contract every pluggable extension implements.
pub trait Extension: Send + Sync {
    /// Class name the object reports about itself.
    fn class_name(&self) -> &str;

    /// Role the object fills.
    fn role(&self) -> ExtensionRole;

    /// Restore serialized prior state shipped with the request.
    fn restore_state(&self, _state: &[u8]) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Capability hook for the per-subjob statistics channel.
    fn as_subjob_sink(&self) -> Option<&dyn SubjobStatsSink> {
        None
    }

    /// Capability hook for the aggregate statistics channel.
    fn as_aggregate_sink(&self) -> Option<&dyn AggregateStatsSink> {
        None
    }
}

impl std::fmt::Debug for dyn Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("class", &self.class_name())
            .field("role", &self.role())
            .finish()
    }
}

/// Constructor registered for a class name.
pub type ExtensionFactory =
    fn(&serde_json::Value) -> Result<Arc<dyn Extension>, ExtensionError>;

/// Explicit class-name to constructor table.
///
/// Deployments register their extension classes before the request is
/// processed; tests inject their own.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    factories: HashMap<String, ExtensionFactory>,
}

impl ExtensionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a class name. A later registration for
    /// the same name replaces the earlier one.
    pub fn register(&mut self, class: impl Into<String>, factory: ExtensionFactory) {
        self.factories.insert(class.into(), factory);
    }

    /// Instantiate one plugin descriptor.
    ///
    /// An empty class leaves the role unset so the engine default applies;
    /// that path never touches the result and never fails.
    pub fn instantiate(
        &self,
        spec: &PluginSpec,
    ) -> Result<Option<Arc<dyn Extension>>, ExtensionError> {
        if spec.class.is_empty() {
            return Ok(None);
        }
        let factory = self
            .factories
            .get(&spec.class)
            .ok_or_else(|| ExtensionError::UnknownClass(spec.class.clone()))?;
        let params = if spec.params.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&spec.params).map_err(|source| ExtensionError::BadParams {
                class: spec.class.clone(),
                source,
            })?
        };
        let extension = factory(&params)?;
        if !spec.state.is_empty() {
            extension.restore_state(&spec.state)?;
        }
        Ok(Some(extension))
    }
}

/// The six pluggable roles bound for one job.
#[derive(Clone, Default, Debug)]
pub struct ExtensionSet {
    /// User comparator, `None` for the engine default.
    pub comparator: Option<Arc<dyn Extension>>,
    /// Merge operator.
    pub merge_operator: Option<Arc<dyn Extension>>,
    /// Compaction-filter factory.
    pub compaction_filter_factory: Option<Arc<dyn Extension>>,
    /// Table factory.
    pub table_factory: Option<Arc<dyn Extension>>,
    /// Key-prefix extractor.
    pub prefix_extractor: Option<Arc<dyn Extension>>,
    /// Output-file partitioner factory.
    pub partitioner_factory: Option<Arc<dyn Extension>>,
}

impl ExtensionSet {
    /// Instantiate every descriptor in the request and attach both optional
    /// statistics channels to each constructed object.
    pub fn instantiate(
        registry: &ExtensionRegistry,
        request: &CompactionRequest,
        hub: &StatsHub,
    ) -> Result<Self, ExtensionError> {
        Ok(Self {
            comparator: bind(registry.instantiate(&request.comparator)?, hub),
            merge_operator: bind(registry.instantiate(&request.merge_operator)?, hub),
            compaction_filter_factory: bind(
                registry.instantiate(&request.compaction_filter_factory)?,
                hub,
            ),
            table_factory: bind(registry.instantiate(&request.table_factory)?, hub),
            prefix_extractor: bind(registry.instantiate(&request.prefix_extractor)?, hub),
            partitioner_factory: bind(registry.instantiate(&request.partitioner_factory)?, hub),
        })
    }
}

fn bind(
    extension: Option<Arc<dyn Extension>>,
    hub: &StatsHub,
) -> Option<Arc<dyn Extension>> {
    if let Some(extension) = &extension {
        if let Some(sink) = extension.as_subjob_sink() {
            sink.bind_subjobs(hub.subjobs());
        }
        if let Some(sink) = extension.as_aggregate_sink() {
            sink.bind_aggregate(hub.aggregate());
        }
    }
    extension
}
