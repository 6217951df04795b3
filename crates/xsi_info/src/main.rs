use anyhow::{bail, Context, Result};
use serde_json::json;
use xsi_core::{load_xsi, LoadOptions, LoadReport, Mesh};

const USAGE: &str = "usage: xsi_info <file.xsi> [--json] [--force-anim] [--force-rgb] [--mirror] [--fast]";

struct Args {
    path: String,
    json: bool,
    options: LoadOptions,
}

fn parse_args() -> Result<Args> {
    let mut path = None;
    let mut json = false;
    let mut options = LoadOptions::default();

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "--force-anim" => options.force_animated_materials = true,
            "--force-rgb" => options.force_rgb_textures = true,
            "--mirror" => options.mirror_z = true,
            "--fast" => options.fast_load = true,
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            file => {
                if path.replace(file.to_string()).is_some() {
                    bail!("only one file can be inspected\n{USAGE}");
                }
            }
        }
    }

    let Some(path) = path else {
        bail!(USAGE);
    };
    Ok(Args {
        path,
        json,
        options,
    })
}

/// One row per cluster: material, faces, triangles, bones, UV channels.
fn cluster_rows(mesh: &Mesh) -> Vec<serde_json::Value> {
    mesh.clusters
        .iter()
        .map(|cluster| {
            let material = mesh.materials.get(cluster.material);
            let faces = &mesh.faces[cluster.face_range.clone()];
            json!({
                "material": material.map_or("?", |m| m.name.as_str()),
                "skinned": material.is_some_and(|m| m.skinned),
                "faces": faces.len(),
                "triangles": faces.iter().map(|f| f.count as usize - 2).sum::<usize>(),
                "bones": cluster.bones.len(),
                "texture_spaces": cluster.texture_spaces,
            })
        })
        .collect()
}

fn print_text(path: &str, mesh: &Mesh, report: &LoadReport) {
    println!("{path}");
    println!(
        "  models {}, joints {}, clusters {}, materials {}, textures {}",
        report.models, report.joints, report.clusters, report.materials, report.textures
    );
    println!(
        "  vertices {}, faces {}, triangles {}",
        report.vertices, report.faces, report.triangles
    );
    if report.animated {
        println!("  animated, {:.2}s", report.duration);
    }
    if let Some((min, max)) = mesh.bounds() {
        println!("  bounds {min} .. {max}");
    }

    for (i, row) in cluster_rows(mesh).iter().enumerate() {
        println!(
            "  cluster {i}: {} faces, {} triangles, {} bones, material {}, uv {}",
            row["faces"], row["triangles"], row["bones"], row["material"], row["texture_spaces"]
        );
    }
    for texture in &mesh.textures {
        let state = if texture.missing { " (missing)" } else { "" };
        println!(
            "  texture {}: {}x{} {:?}{}",
            texture.name, texture.width, texture.height, texture.format, state
        );
    }
    for diagnostic in &report.diagnostics {
        println!("  line {}: {}", diagnostic.line, diagnostic.message);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = parse_args()?;
    let mut mesh = Mesh::new(args.path.clone());
    let report = load_xsi(&mut mesh, &args.path, &args.options)
        .with_context(|| format!("failed to load {}", args.path))?;

    if args.json {
        let output = json!({
            "file": args.path,
            "options": args.options,
            "report": report,
            "clusters": cluster_rows(&mesh),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&args.path, &mesh, &report);
    }
    Ok(())
}
