use crate::scene::{NodeMetadata, NodeType, SceneNode, TraversalConfig};
use regex::Regex;
use std::sync::OnceLock;

/// Editor-assigned default layer names: `Frame 12`, `Group 3`, `Rectangle 45`
/// and friends, plus bare `Instance` (numbered or not). A container still
/// carrying one of these needs a label; a human-renamed one does not.
pub fn is_default_name(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?:Frame|Group|Rectangle|Ellipse|Polygon|Star|Line|Vector|Slice|Section|Component|Text) \d+|Instance(?: \d+)?)$",
        )
        .unwrap()
    });
    re.is_match(name.trim())
}

enum Verdict {
    /// Emit the node, keep walking its children.
    Include,
    /// Emit the node, suppress its subtree.
    IncludeLeaf,
    /// Do not emit, keep walking its children.
    Exclude,
    /// Do not emit and drop the whole subtree.
    SkipSubtree,
}

/// First matching rule decides; later rules never see the node.
fn judge(node: &SceneNode, config: &TraversalConfig) -> Verdict {
    let ty = node.node_type;

    if ty.is_decorative() {
        return Verdict::SkipSubtree;
    }
    if !node.visible && !config.include_invisible {
        // Hidden layers hide their subtree with them.
        return Verdict::SkipSubtree;
    }
    if node.locked && !config.include_locked {
        return Verdict::Exclude;
    }
    if let Some(bbox) = &node.absolute_bounding_box {
        // Nodes without a box are kept: area cannot be judged.
        if bbox.area() < config.min_node_area {
            return if ty.is_component_boundary() {
                Verdict::SkipSubtree
            } else {
                Verdict::Exclude
            };
        }
    }
    if ty.is_component_boundary() {
        return Verdict::IncludeLeaf;
    }
    if ty == NodeType::Section {
        return Verdict::Include;
    }
    if ty == NodeType::Text {
        return Verdict::Include;
    }
    if ty.is_container() {
        // Auto-layout wrappers with a single child are pure structure.
        if node.has_auto_layout() && node.children.len() == 1 {
            return Verdict::Exclude;
        }
        return if is_default_name(&node.name) {
            Verdict::Include
        } else {
            Verdict::Exclude
        };
    }
    if config.include_node_types.contains(&ty) {
        return Verdict::Include;
    }
    Verdict::Exclude
}

/// Depth-first pre-order selection: parents always precede their children in
/// the result. Pure function of (tree, config); bounded by the config's
/// depth and node ceilings, which truncate silently rather than erroring.
pub fn select(roots: &[SceneNode], config: &TraversalConfig) -> Vec<NodeMetadata> {
    let mut out = Vec::new();
    for root in roots {
        walk(root, None, 0, config, &mut out);
    }
    if out.len() >= config.max_nodes {
        log::warn!(
            "node selection truncated at {} nodes; tree is larger",
            config.max_nodes
        );
    }
    out
}

fn walk(
    node: &SceneNode,
    parent_id: Option<&str>,
    depth: usize,
    config: &TraversalConfig,
    out: &mut Vec<NodeMetadata>,
) {
    if out.len() >= config.max_nodes {
        return;
    }
    if depth > config.max_depth {
        log::debug!("depth ceiling {} hit at node {}", config.max_depth, node.id);
        return;
    }

    let recurse = match judge(node, config) {
        Verdict::Include => {
            out.push(NodeMetadata::from_node(node, depth, parent_id));
            true
        }
        Verdict::IncludeLeaf => {
            out.push(NodeMetadata::from_node(node, depth, parent_id));
            false
        }
        Verdict::Exclude => true,
        Verdict::SkipSubtree => false,
    };

    if recurse {
        for child in &node.children {
            walk(child, Some(&node.id), depth + 1, config, out);
        }
    }
}

/// Chunk a selection into annotation batches; markIds restart per batch.
pub fn batches(nodes: &[NodeMetadata], batch_size: usize) -> impl Iterator<Item = &[NodeMetadata]> {
    nodes.chunks(batch_size.max(1))
}
