//! Hardware topology for QDrive
//!
//! Gantree: L1_Topology → HardwareTopology
//!
//! A declarative nested graph (objects and lists) mapping physical instrument
//! channels to logical element ports and clocks. Port-clock entries are
//! objects carrying a `port` key; everything above them is channel location.

use crate::constants::hardware;
use crate::error::{QdriveError, QdriveResult};
use crate::types::{ElementId, PortKind, PortName};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Key holding the port-clock list under a channel
pub const PORTCLOCK_KEY: &str = "portclock_configs";

/// Key holding the instrument type of a cluster or module
pub const INSTRUMENT_TYPE_KEY: &str = "instrument_type";

// ============================================================================
// PhysicalPath
// ============================================================================

/// One step of a path through the topology graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// List index
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Resolved location of a port-clock entry
/// Gantree: PhysicalPath // 물리 경로
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalPath {
    segments: Vec<PathSegment>,
}

impl PhysicalPath {
    /// Create from segments
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Path segments from the root
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Instrument channel address, e.g. `cluster_dr4.module12.complex_output_0`
    /// Gantree: channel_address() -> String // 채널 주소
    pub fn channel_address(&self) -> String {
        self.segments
            .iter()
            .take_while(|s| !matches!(s, PathSegment::Key(k) if k == PORTCLOCK_KEY))
            .filter_map(|s| match s {
                PathSegment::Key(k) => Some(k.as_str()),
                PathSegment::Index(_) => None,
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for PhysicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join("/"))
    }
}

// ============================================================================
// HardwareTopology
// ============================================================================

/// Nested hardware topology graph
/// Gantree: HardwareTopology // 토폴로지 그래프
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareTopology {
    graph: Value,
}

impl Default for HardwareTopology {
    fn default() -> Self {
        Self {
            graph: Value::Object(Map::new()),
        }
    }
}

impl HardwareTopology {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Wrap an existing graph
    pub fn from_value(graph: Value) -> Self {
        Self { graph }
    }

    /// Raw graph
    pub fn as_value(&self) -> &Value {
        &self.graph
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolve a logical port (and optional clock) to its unique physical path
    /// Gantree: resolve(port,clock?) -> PhysicalPath // 경로 탐색
    ///
    /// Depth-first over the graph with a path stack. Zero matches is
    /// `NotFound`; more than one is a `TopologyResolution` error.
    pub fn resolve(&self, port: &str, clock: Option<&str>) -> QdriveResult<PhysicalPath> {
        let mut stack = Vec::new();
        let mut hits = Vec::new();
        search(&self.graph, port, clock, &mut stack, &mut hits);

        match hits.len() {
            0 => Err(QdriveError::NotFound {
                port: port.to_string(),
                clock: clock.map(str::to_string),
            }),
            1 => Ok(hits.remove(0)),
            n => Err(QdriveError::TopologyResolution(format!(
                "port '{}' is ambiguous: {} matching paths ({})",
                port,
                n,
                hits.iter()
                    .map(|h| h.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Resolve a typed port with its canonical clock
    pub fn resolve_port(&self, port: &PortName) -> QdriveResult<PhysicalPath> {
        let clock = port.clock();
        self.resolve(&port.to_string(), Some(&clock))
    }

    /// Channel address of an element's flux line, if it has one
    /// Gantree: flux_channel(element) -> Option<String> // 플럭스 라인
    pub fn flux_channel(&self, element: ElementId) -> QdriveResult<Option<String>> {
        match self.resolve_port(&element.port(PortKind::Flux)) {
            Ok(path) => Ok(Some(path.channel_address())),
            Err(QdriveError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Every (port, clock) entry declared in the graph
    pub fn declared_ports(&self) -> Vec<(String, Option<String>)> {
        let mut out = Vec::new();
        collect_ports(&self.graph, &mut out);
        out
    }

    /// Elements with at least one declared port
    pub fn elements(&self) -> QdriveResult<BTreeSet<ElementId>> {
        self.declared_ports()
            .iter()
            .map(|(port, _)| PortName::parse(port).map(|p| p.element))
            .collect()
    }

    /// Check every declared port resolves to exactly one path
    /// Gantree: validate() -> Result // 검증
    pub fn validate(&self) -> QdriveResult<()> {
        let ports = self.declared_ports();
        if ports.is_empty() {
            return Err(QdriveError::TopologyResolution(
                "topology declares no ports".to_string(),
            ));
        }
        for (port, clock) in &ports {
            PortName::parse(port).map_err(|e| {
                QdriveError::TopologyResolution(format!("invalid port '{}': {}", port, e))
            })?;
            self.resolve(port, clock.as_deref()).map_err(|e| match e {
                QdriveError::NotFound { .. } => QdriveError::TopologyResolution(e.to_string()),
                other => other,
            })?;
        }
        Ok(())
    }
}

fn search(
    node: &Value,
    port: &str,
    clock: Option<&str>,
    stack: &mut Vec<PathSegment>,
    hits: &mut Vec<PhysicalPath>,
) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(p)) = map.get("port") {
                let clock_ok = match clock {
                    Some(c) => map.get("clock").and_then(Value::as_str) == Some(c),
                    None => true,
                };
                if p == port && clock_ok {
                    hits.push(PhysicalPath::new(stack.clone()));
                }
                return;
            }
            for (key, child) in map {
                stack.push(PathSegment::Key(key.clone()));
                search(child, port, clock, stack, hits);
                stack.pop();
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                stack.push(PathSegment::Index(idx));
                search(child, port, clock, stack, hits);
                stack.pop();
            }
        }
        _ => {}
    }
}

fn collect_ports(node: &Value, out: &mut Vec<(String, Option<String>)>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(p)) = map.get("port") {
                let clock = map.get("clock").and_then(Value::as_str).map(str::to_string);
                out.push((p.clone(), clock));
                return;
            }
            map.values().for_each(|child| collect_ports(child, out));
        }
        Value::Array(items) => items.iter().for_each(|child| collect_ports(child, out)),
        _ => {}
    }
}

// ============================================================================
// TopologyComposer
// ============================================================================

/// Declared wiring of one logical port
/// Gantree: PortSpec // {port, slot, output}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Logical port, e.g. "q0:mw"
    pub port: String,
    /// Cluster module slot
    pub slot: u32,
    /// Output index on the module
    pub output: u32,
}

impl PortSpec {
    /// Create new port spec
    pub fn new(port: &str, slot: u32, output: u32) -> Self {
        Self {
            port: port.to_string(),
            slot,
            output,
        }
    }
}

/// Builds a topology graph from flat port wiring
/// Gantree: TopologyComposer // 토폴로지 구성
pub struct TopologyComposer;

impl TopologyComposer {
    /// Compose the graph for one drawer
    ///
    /// Drive ports land on RF control modules, readout ports on RF readout
    /// modules and flux ports on baseband control modules.
    pub fn compose(specs: &[PortSpec], drawer: &str) -> QdriveResult<HardwareTopology> {
        let cluster_name = format!("cluster_{}", drawer.to_lowercase());
        let mut cluster = Map::new();
        cluster.insert(INSTRUMENT_TYPE_KEY.to_string(), json!("Cluster"));

        for spec in specs {
            let port = PortName::parse(&spec.port)?;
            let (module_type, output_key, lo) = match port.kind {
                PortKind::Drive => (
                    "QCM_RF",
                    format!("complex_output_{}", spec.output),
                    Some(hardware::DRIVE_LO_HZ),
                ),
                PortKind::Readout => (
                    "QRM_RF",
                    format!("complex_output_{}", spec.output),
                    Some(hardware::READOUT_LO_HZ),
                ),
                PortKind::Flux => ("QCM", format!("real_output_{}", spec.output), None),
            };

            let module_key = format!("module{}", spec.slot);
            let module = cluster
                .entry(module_key.clone())
                .or_insert_with(|| json!({ INSTRUMENT_TYPE_KEY: module_type }));
            let module = module.as_object_mut().ok_or_else(|| {
                QdriveError::TopologyResolution(format!("{} is not an object", module_key))
            })?;

            let existing = module.get(INSTRUMENT_TYPE_KEY).and_then(Value::as_str);
            if existing != Some(module_type) {
                return Err(QdriveError::ParameterValidation(format!(
                    "slot {} declared as {} and {}",
                    spec.slot,
                    existing.unwrap_or("unknown"),
                    module_type
                )));
            }

            let output = module.entry(output_key).or_insert_with(|| {
                let mut out = Map::new();
                if let Some(lo) = lo {
                    out.insert("lo_freq".to_string(), json!(lo));
                }
                out.insert(PORTCLOCK_KEY.to_string(), json!([]));
                Value::Object(out)
            });

            if let Some(list) = output.get_mut(PORTCLOCK_KEY).and_then(Value::as_array_mut) {
                list.push(json!({ "port": port.to_string(), "clock": port.clock() }));
            }
        }

        let mut root = Map::new();
        root.insert(cluster_name, Value::Object(cluster));
        Ok(HardwareTopology::from_value(Value::Object(root)))
    }
}

// ============================================================================
// Tests
// ============================================================================
