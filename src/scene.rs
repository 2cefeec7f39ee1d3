use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Read};

/// Design-tool node tags. Exports spell these in SCREAMING_SNAKE_CASE;
/// unknown tags from newer tool versions deserialize as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Document,
    Page,
    Frame,
    Group,
    Section,
    Component,
    ComponentSet,
    Instance,
    Text,
    Rectangle,
    Vector,
    Line,
    Ellipse,
    Polygon,
    Star,
    BooleanOperation,
    Slice,
    #[serde(other)]
    Unknown,
}

impl NodeType {
    /// Decorative primitives that never carry semantic meaning on their own.
    pub fn is_decorative(self) -> bool {
        matches!(
            self,
            NodeType::Vector
                | NodeType::Line
                | NodeType::Ellipse
                | NodeType::Polygon
                | NodeType::Star
                | NodeType::BooleanOperation
                | NodeType::Slice
        )
    }

    /// Reusable-component boundaries; their internals are an implementation
    /// detail and the walk never descends into them.
    pub fn is_component_boundary(self) -> bool {
        matches!(
            self,
            NodeType::Instance | NodeType::Component | NodeType::ComponentSet
        )
    }

    pub fn is_container(self) -> bool {
        matches!(self, NodeType::Frame | NodeType::Group)
    }
}

/// Absolute, axis-aligned bounding box in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Area of the axis-aligned intersection; zero when disjoint or when
    /// the rectangles only touch along an edge.
    pub fn intersection_area(&self, other: &BoundingBox) -> f64 {
        let overlap_w = (self.x + self.width).min(other.x + other.width) - self.x.max(other.x);
        let overlap_h = (self.y + self.height).min(other.y + other.height) - self.y.max(other.y);
        if overlap_w <= 0.0 || overlap_h <= 0.0 {
            return 0.0;
        }
        overlap_w * overlap_h
    }

    pub fn translated(&self, dx: f64, dy: f64) -> BoundingBox {
        BoundingBox::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn scaled(&self, factor: f64) -> BoundingBox {
        BoundingBox::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

/// One element of the scene graph as delivered by the design tool (live API
/// or serialized export). Supplied externally and read-only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub absolute_bounding_box: Option<BoundingBox>,
    /// Text content for TEXT nodes.
    #[serde(default)]
    pub characters: Option<String>,
    /// Auto-layout direction: HORIZONTAL, VERTICAL, or absent/NONE.
    #[serde(default)]
    pub layout_mode: Option<String>,
    #[serde(default)]
    pub bound_variables: Option<Map<String, Value>>,
    #[serde(default)]
    pub component_properties: Option<Map<String, Value>>,
    #[serde(default)]
    pub children: Vec<SceneNode>,
}

fn default_true() -> bool {
    true
}

impl SceneNode {
    pub fn has_auto_layout(&self) -> bool {
        self.layout_mode
            .as_deref()
            .map(|mode| !mode.eq_ignore_ascii_case("none"))
            .unwrap_or(false)
    }
}

/// Traversal/selection knobs. Immutable per `select` call; a partial JSON
/// config deserializes with the same defaults as `Default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraversalConfig {
    pub include_invisible: bool,
    pub include_locked: bool,
    /// Minimum bounding-box area in px²; nodes without a box are kept.
    pub min_node_area: f64,
    pub include_node_types: Vec<NodeType>,
    /// Selected nodes per annotation batch.
    pub batch_size: usize,
    /// Recursion ceiling; deeper subtrees are silently dropped.
    pub max_depth: usize,
    /// Emission ceiling; traversal stops emitting once reached.
    pub max_nodes: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            include_invisible: false,
            include_locked: false,
            min_node_area: 16.0,
            include_node_types: vec![NodeType::Rectangle],
            batch_size: 20,
            max_depth: 64,
            max_nodes: 2000,
        }
    }
}

/// Immutable snapshot of one selected node. Created once per traversal and
/// never mutated afterward; `parent_id` is informational only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub id: String,
    pub original_name: String,
    pub node_type: NodeType,
    pub bounding_box: Option<BoundingBox>,
    pub depth: usize,
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variable_refs: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    pub has_children: bool,
    pub child_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_mode: Option<String>,
}

impl NodeMetadata {
    pub fn from_node(node: &SceneNode, depth: usize, parent_id: Option<&str>) -> Self {
        Self {
            id: node.id.clone(),
            original_name: node.name.clone(),
            node_type: node.node_type,
            bounding_box: node.absolute_bounding_box,
            depth,
            parent_id: parent_id.map(ToString::to_string),
            text: node.characters.clone(),
            variable_refs: node
                .bound_variables
                .as_ref()
                .map(|vars| vars.keys().cloned().collect())
                .unwrap_or_default(),
            properties: node.component_properties.clone().unwrap_or_default(),
            has_children: !node.children.is_empty(),
            child_count: node.children.len(),
            layout_mode: node.layout_mode.clone(),
        }
    }
}

/// Load scene roots from a JSON file (`-` reads stdin). Accepts a single
/// root object, a top-level array, or an object with a `roots` array.
pub fn load_scene(path: &str) -> Result<Vec<SceneNode>> {
    let raw = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read scene from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read scene file: {path}"))?
    };

    let value: Value = serde_json::from_str(&raw).context("invalid scene JSON")?;
    match value {
        Value::Array(_) => serde_json::from_value(value).context("invalid scene node array"),
        Value::Object(ref obj) if obj.contains_key("roots") => {
            serde_json::from_value(obj["roots"].clone()).context("invalid 'roots' array")
        }
        Value::Object(_) => {
            let root: SceneNode = serde_json::from_value(value).context("invalid scene node")?;
            Ok(vec![root])
        }
        _ => bail!("scene must be a node object, a node array, or an object with 'roots'"),
    }
}
