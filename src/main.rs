use anyhow::{bail, Context, Result};
use canvas_annotator::label::{initialize_labels, BadgeStyle};
use canvas_annotator::optimize::{optimize_label_positions, AnnealParams};
use canvas_annotator::overlap::{detect_overlap, union_box};
use canvas_annotator::render::{parse_color, render_annotated, AnnotationStyle};
use canvas_annotator::scene::{load_scene, BoundingBox, NodeMetadata, NodeType, TraversalConfig};
use canvas_annotator::select::{batches, select};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde_json::{json, Value};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const SCENE_HELP: &str = r##"Scene JSON shape (single root, array of roots, or {"roots": [...]}):
{
  "id": "0:1",
  "name": "Frame 1",
  "type": "FRAME",
  "visible": true,
  "locked": false,
  "absoluteBoundingBox": {"x": 0, "y": 0, "width": 375, "height": 812},
  "layoutMode": "VERTICAL",
  "children": [
    {"id": "0:2", "name": "Title", "type": "TEXT", "characters": "Welcome",
     "absoluteBoundingBox": {"x": 24, "y": 48, "width": 200, "height": 32}},
    {"id": "0:3", "name": "Login Button", "type": "INSTANCE",
     "absoluteBoundingBox": {"x": 24, "y": 700, "width": 327, "height": 48}}
  ]
}

Notes:
- node types follow the design-tool tags (FRAME, GROUP, SECTION, COMPONENT,
  COMPONENT_SET, INSTANCE, TEXT, RECTANGLE, ...); unknown tags are kept but
  only selected when listed via --types.
- visible defaults to true and locked to false when omitted.
- nodes without absoluteBoundingBox survive selection but cannot be
  highlighted, so annotate skips them when assigning badge numbers.
"##;

#[derive(Parser, Debug)]
#[command(
    name = "canvas-annotate",
    version,
    about = "Select scene-graph nodes, lay out numeric badges without overlap, and composite them onto a design screenshot"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run node selection over a scene tree and print the metadata JSON
    Select(SelectArgs),
    /// Annotate a rendered design: highlight boxes + optimized badges
    Annotate(AnnotateArgs),
    /// Check whether highlight boxes would crowd each other when annotated
    #[command(name = "detect-overlap")]
    DetectOverlap(DetectOverlapArgs),
}

#[derive(Args, Debug, Clone)]
struct SelectionFlags {
    /// Keep invisible nodes
    #[arg(long, action = ArgAction::SetTrue)]
    include_invisible: bool,
    /// Keep locked nodes
    #[arg(long, action = ArgAction::SetTrue)]
    include_locked: bool,
    /// Minimum bounding-box area in px² (nodes without a box are kept)
    #[arg(long)]
    min_area: Option<f64>,
    /// Comma-separated extra node types to allow (e.g. rectangle,unknown)
    #[arg(long)]
    types: Option<String>,
    /// Selected nodes per annotation batch
    #[arg(long)]
    batch_size: Option<usize>,
    /// Recursion depth ceiling
    #[arg(long)]
    max_depth: Option<usize>,
    /// Emitted node ceiling
    #[arg(long)]
    max_nodes: Option<usize>,
}

#[derive(Args, Debug)]
struct SelectArgs {
    /// Scene JSON path (or - for stdin)
    scene: String,
    #[command(flatten)]
    selection: SelectionFlags,
    /// Write the selection JSON here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Input PNG path (the rendered design)
    input: PathBuf,
    /// Output PNG path
    output: PathBuf,
    /// Scene JSON path (or - for stdin)
    #[arg(long)]
    scene: Option<String>,
    #[command(flatten)]
    selection: SelectionFlags,
    /// Which batch of the selection to annotate
    #[arg(long, default_value_t = 0)]
    batch: usize,
    /// Seed for the layout optimizer (omit for entropy)
    #[arg(long)]
    seed: Option<u64>,
    /// Annealing iteration budget
    #[arg(long, default_value_t = 200)]
    iterations: usize,
    /// Badge numeral size in px
    #[arg(long, default_value_t = 12.0)]
    font_size: f64,
    /// Badge fill color (#RRGGBB or #RRGGBBAA)
    #[arg(long)]
    badge_color: Option<String>,
    /// Path to write the markId-to-node sidecar (default: <output>.json)
    #[arg(long)]
    meta_out: Option<PathBuf>,
    /// Disable the metadata sidecar
    #[arg(long, action = ArgAction::SetTrue)]
    no_meta: bool,
    /// Print the scene schema and exit
    #[arg(long, action = ArgAction::SetTrue)]
    scene_help: bool,
}

#[derive(Args, Debug)]
struct DetectOverlapArgs {
    /// JSON path with an array of boxes, or {"boxes": [...], "reference": {...}}
    #[arg(long)]
    boxes: String,
    /// Render scale applied to the boxes
    #[arg(long, default_value_t = 1.0)]
    scale: f64,
    /// Badge numeral size in px
    #[arg(long, default_value_t = 12.0)]
    font_size: f64,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Select(args) => command_select(args),
        Commands::Annotate(args) => command_annotate(args),
        Commands::DetectOverlap(args) => command_detect_overlap(args),
    }
}

fn build_config(flags: &SelectionFlags) -> Result<TraversalConfig> {
    let mut config = TraversalConfig {
        include_invisible: flags.include_invisible,
        include_locked: flags.include_locked,
        ..TraversalConfig::default()
    };
    if let Some(min_area) = flags.min_area {
        config.min_node_area = min_area;
    }
    if let Some(batch_size) = flags.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(max_depth) = flags.max_depth {
        config.max_depth = max_depth;
    }
    if let Some(max_nodes) = flags.max_nodes {
        config.max_nodes = max_nodes;
    }
    if let Some(raw) = &flags.types {
        config.include_node_types = parse_node_types(raw)?;
    }
    Ok(config)
}

fn parse_node_types(raw: &str) -> Result<Vec<NodeType>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            serde_json::from_value::<NodeType>(Value::String(part.to_ascii_uppercase()))
                .with_context(|| format!("unknown node type: {part}"))
        })
        .collect()
}

fn command_select(args: SelectArgs) -> Result<()> {
    let roots = load_scene(&args.scene)?;
    let config = build_config(&args.selection)?;
    let selected = select(&roots, &config);
    let truncated = selected.len() >= config.max_nodes;

    let payload = json!({
        "selection_version": 1,
        "count": selected.len(),
        "truncated": truncated,
        "config": config,
        "nodes": selected,
    });

    if let Some(out) = &args.out {
        write_json_pretty(out, &payload)?;
        println!("{}", abs_path(out).display());
    } else {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

fn command_annotate(args: AnnotateArgs) -> Result<()> {
    if args.scene_help {
        println!("{}", SCENE_HELP.trim());
        return Ok(());
    }

    if !args.input.exists() {
        bail!("input not found: {}", args.input.display());
    }
    let Some(scene_path) = &args.scene else {
        bail!("--scene is required (or pass --scene-help for the schema)");
    };

    let roots = load_scene(scene_path)?;
    let config = build_config(&args.selection)?;
    let selected = select(&roots, &config);
    if selected.is_empty() {
        bail!("selection is empty: nothing to annotate");
    }
    let truncated = selected.len() >= config.max_nodes;

    let all_batches: Vec<&[NodeMetadata]> = batches(&selected, config.batch_size).collect();
    let Some(batch) = all_batches.get(args.batch).copied() else {
        bail!(
            "batch {} out of range: selection has {} batch(es)",
            args.batch,
            all_batches.len()
        );
    };

    // Only nodes with a bounding box can be highlighted; badge numbers
    // follow the surviving order.
    let annotated: Vec<(&NodeMetadata, BoundingBox)> = batch
        .iter()
        .filter_map(|m| m.bounding_box.map(|bbox| (m, bbox)))
        .collect();
    if annotated.is_empty() {
        bail!("batch {} has no nodes with bounding boxes", args.batch);
    }
    let highlights: Vec<BoundingBox> = annotated.iter().map(|(_, bbox)| *bbox).collect();

    let base = image::open(&args.input)
        .with_context(|| format!("failed to open input image: {}", args.input.display()))?;
    let (img_w, img_h) = (base.width(), base.height());
    if img_w == 0 || img_h == 0 {
        bail!("degenerate canvas: {}x{}", img_w, img_h);
    }

    let mut style = AnnotationStyle {
        badge: BadgeStyle {
            font_size: args.font_size,
            ..BadgeStyle::default()
        },
        ..AnnotationStyle::default()
    };
    if let Some(raw) = &args.badge_color {
        let Some(color) = parse_color(raw) else {
            bail!("invalid badge color: {raw}");
        };
        style.badge.fill = color;
        style.highlight.stroke = color;
        style.highlight.fill = image::Rgba([color[0], color[1], color[2], 46]);
    }

    let params = AnnealParams {
        iterations: args.iterations,
        ..AnnealParams::default()
    };
    let initial = initialize_labels(&highlights, &style.badge);
    let mut rng: Box<dyn RngCore> = match args.seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(rand::thread_rng()),
    };
    let labels = optimize_label_positions(
        &initial,
        f64::from(img_w),
        f64::from(img_h),
        &params,
        &mut rng,
    );

    let bytes = render_annotated(&base, &highlights, &labels, &style)?;
    ensure_parent_dir(&args.output)?;
    fs::write(&args.output, bytes)
        .with_context(|| format!("failed to save output image: {}", args.output.display()))?;

    if !args.no_meta {
        let meta_path = args
            .meta_out
            .clone()
            .unwrap_or_else(|| default_sidecar_for(&args.output));
        ensure_parent_dir(&meta_path)?;

        let marks: Vec<Value> = labels
            .iter()
            .zip(&annotated)
            .map(|(label, (meta, _))| {
                json!({
                    "markId": label.mark_id,
                    "nodeId": meta.id,
                    "name": meta.original_name,
                    "nodeType": meta.node_type,
                    "boundingBox": meta.bounding_box,
                    "badge": {"x": label.x, "y": label.y, "width": label.width, "height": label.height},
                    "anchor": {"x": label.anchor_x, "y": label.anchor_y},
                })
            })
            .collect();

        let payload = json!({
            "annotation_meta_version": 1,
            "input_path": abs_path(&args.input).display().to_string(),
            "output_path": abs_path(&args.output).display().to_string(),
            "meta_path": abs_path(&meta_path).display().to_string(),
            "generated_at": timestamp_iso(),
            "size": {"width": img_w, "height": img_h, "units": "px"},
            "batch": {"index": args.batch, "count": all_batches.len(), "size": batch.len()},
            "selection": {"count": selected.len(), "truncated": truncated},
            "config": config,
            "marks": marks,
        });

        write_json_pretty(&meta_path, &payload)?;
    }

    println!("{}", abs_path(&args.output).display());
    Ok(())
}

fn command_detect_overlap(args: DetectOverlapArgs) -> Result<()> {
    if args.scale <= 0.0 {
        bail!("scale must be positive");
    }
    let (boxes, reference) = load_boxes(&args.boxes)?;
    let Some(reference) = reference.or_else(|| union_box(&boxes)) else {
        bail!("no boxes provided");
    };
    let overlap = detect_overlap(&boxes, &reference, args.scale, args.font_size);
    println!(
        "{}",
        json!({"overlap": overlap, "count": boxes.len(), "scale": args.scale})
    );
    Ok(())
}

/// Boxes file: a bare array of boxes, or an object with `boxes` and an
/// optional `reference` crop region.
fn load_boxes(path: &str) -> Result<(Vec<BoundingBox>, Option<BoundingBox>)> {
    let raw = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read boxes from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read boxes file: {path}"))?
    };

    let value: Value = serde_json::from_str(&raw).context("invalid boxes JSON")?;
    match value {
        Value::Array(_) => {
            let boxes = serde_json::from_value(value).context("invalid box array")?;
            Ok((boxes, None))
        }
        Value::Object(obj) => {
            let boxes = obj
                .get("boxes")
                .cloned()
                .context("boxes object must contain a 'boxes' array")?;
            let boxes = serde_json::from_value(boxes).context("invalid 'boxes' array")?;
            let reference = match obj.get("reference") {
                Some(v) => Some(serde_json::from_value(v.clone()).context("invalid 'reference' box")?),
                None => None,
            };
            Ok((boxes, reference))
        }
        _ => bail!("boxes must be an array or an object with 'boxes'"),
    }
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let rendered = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{rendered}\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn default_sidecar_for(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().map(|v| v.to_os_string()).unwrap_or_default();
    file_name.push(".json");
    path.with_file_name(file_name)
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_node_types_accepts_lowercase_tags() {
        let types = parse_node_types("rectangle, component_set").unwrap();
        assert_eq!(types, vec![NodeType::Rectangle, NodeType::ComponentSet]);
        assert!(parse_node_types("blorp").is_err());
    }

    #[test]
    fn default_sidecar_appends_json_suffix() {
        let sidecar = default_sidecar_for(Path::new("/tmp/out/shot.png"));
        assert_eq!(sidecar, PathBuf::from("/tmp/out/shot.png.json"));
    }

    #[test]
    fn write_json_pretty_creates_parents() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b.json");
        write_json_pretty(&target, &json!({"ok": true})).unwrap();
        assert!(target.exists());
    }

    #[test]
    fn load_boxes_accepts_array_and_object_forms() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.json");
        fs::write(&plain, r#"[{"x": 0, "y": 0, "width": 10, "height": 10}]"#).unwrap();
        let (boxes, reference) = load_boxes(plain.to_str().unwrap()).unwrap();
        assert_eq!(boxes.len(), 1);
        assert!(reference.is_none());

        let wrapped = dir.path().join("wrapped.json");
        fs::write(
            &wrapped,
            r#"{"boxes": [{"x": 0, "y": 0, "width": 10, "height": 10}],
                "reference": {"x": 0, "y": 0, "width": 100, "height": 100}}"#,
        )
        .unwrap();
        let (boxes, reference) = load_boxes(wrapped.to_str().unwrap()).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(reference.unwrap().width, 100.0);
    }

    fn empty_flags() -> SelectionFlags {
        SelectionFlags {
            include_invisible: false,
            include_locked: false,
            min_area: None,
            types: None,
            batch_size: None,
            max_depth: None,
            max_nodes: None,
        }
    }

    const SCENE_FIXTURE: &str = r#"{
        "id": "0:1", "name": "Frame 1", "type": "FRAME",
        "absoluteBoundingBox": {"x": 0, "y": 0, "width": 200, "height": 160},
        "children": [
            {"id": "0:2", "name": "Title", "type": "TEXT",
             "absoluteBoundingBox": {"x": 20, "y": 40, "width": 80, "height": 24}},
            {"id": "0:3", "name": "CTA", "type": "INSTANCE",
             "absoluteBoundingBox": {"x": 20, "y": 100, "width": 120, "height": 32}}
        ]
    }"#;

    #[test]
    fn select_writes_payload_with_count() {
        let dir = tempdir().unwrap();
        let scene = dir.path().join("scene.json");
        fs::write(&scene, SCENE_FIXTURE).unwrap();
        let out = dir.path().join("selection.json");
        command_select(SelectArgs {
            scene: scene.to_str().unwrap().to_string(),
            selection: empty_flags(),
            out: Some(out.clone()),
        })
        .unwrap();

        let payload: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(payload["count"], 3);
        assert_eq!(payload["truncated"], false);
        let nodes = payload["nodes"].as_array().unwrap();
        assert_eq!(nodes[0]["nodeType"], "FRAME");
        assert_eq!(nodes[1]["depth"], 1);
    }

    #[test]
    fn annotate_writes_image_and_sidecar() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("base.png");
        image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            200,
            160,
            image::Rgba([250, 250, 250, 255]),
        ))
        .save(&input)
        .unwrap();
        let scene = dir.path().join("scene.json");
        fs::write(&scene, SCENE_FIXTURE).unwrap();

        let output = dir.path().join("annotated.png");
        command_annotate(AnnotateArgs {
            input: input.clone(),
            output: output.clone(),
            scene: Some(scene.to_str().unwrap().to_string()),
            selection: empty_flags(),
            batch: 0,
            seed: Some(7),
            iterations: 50,
            font_size: 12.0,
            badge_color: None,
            meta_out: None,
            no_meta: false,
            scene_help: false,
        })
        .unwrap();

        let decoded = image::open(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 160));

        let sidecar_path = output.with_file_name("annotated.png.json");
        let sidecar: Value =
            serde_json::from_str(&fs::read_to_string(&sidecar_path).unwrap()).unwrap();
        let marks = sidecar["marks"].as_array().unwrap();
        assert_eq!(marks.len(), 3);
        assert_eq!(marks[0]["markId"], 1);
        assert_eq!(marks[0]["nodeId"], "0:1");
        assert_eq!(sidecar["batch"]["count"], 1);
    }

    #[test]
    fn annotate_rejects_out_of_range_batch() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("base.png");
        image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            64,
            64,
            image::Rgba([255, 255, 255, 255]),
        ))
        .save(&input)
        .unwrap();
        let scene = dir.path().join("scene.json");
        fs::write(&scene, SCENE_FIXTURE).unwrap();

        let err = command_annotate(AnnotateArgs {
            input,
            output: dir.path().join("annotated.png"),
            scene: Some(scene.to_str().unwrap().to_string()),
            selection: empty_flags(),
            batch: 9,
            seed: None,
            iterations: 10,
            font_size: 12.0,
            badge_color: None,
            meta_out: None,
            no_meta: true,
            scene_help: false,
        })
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn cli_parses_annotate_flags() {
        let cli = Cli::try_parse_from([
            "canvas-annotate",
            "annotate",
            "in.png",
            "out.png",
            "--scene",
            "scene.json",
            "--batch",
            "1",
            "--seed",
            "42",
            "--badge-color",
            "#0A84FF",
        ])
        .unwrap();
        let Commands::Annotate(args) = cli.command else {
            panic!("expected annotate");
        };
        assert_eq!(args.batch, 1);
        assert_eq!(args.seed, Some(42));
        assert_eq!(args.badge_color.as_deref(), Some("#0A84FF"));
    }
}
