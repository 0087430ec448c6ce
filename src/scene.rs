use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::camera::Transform;
use crate::config::ConfigOverrides;
use crate::mesh::{self, MeshData};
use crate::obj::load_obj_from_str;

/// Where a mesh comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeshSource {
    Plane,
    Cube,
    File(PathBuf),
}

/// Procedurally generated textures, so the demo runs without an asset folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinTexture {
    BrickColor,
    BrickNormal,
    FlatNormal,
    CarPaint,
}

/// Where a texture comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextureSource {
    Builtin(BuiltinTexture),
    File(PathBuf),
}

/// Color textures are sampled as sRGB, normal maps as linear data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureKind {
    Color,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshAsset {
    pub name: String,
    pub source: MeshSource,
}

impl MeshAsset {
    /// Builds or reads the mesh geometry.
    pub fn load(&self) -> Result<MeshData> {
        match &self.source {
            MeshSource::Plane => Ok(mesh::plane()),
            MeshSource::Cube => Ok(mesh::cube()),
            MeshSource::File(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("unable to read mesh {}", path.display()))?;
                load_obj_from_str(&contents)
                    .with_context(|| format!("failed to parse OBJ mesh {}", path.display()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureAsset {
    pub name: String,
    pub source: TextureSource,
    pub kind: TextureKind,
}

/// One drawable: a shared mesh, its own transform and its texture pair.
///
/// Mesh and texture fields index into the owning [`SceneDescription`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneInstance {
    pub name: String,
    pub mesh: usize,
    pub color_texture: usize,
    pub normal_texture: usize,
    pub transform: Transform,
}

/// Assets plus the ordered list of instances drawn in every eye.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub meshes: Vec<MeshAsset>,
    pub textures: Vec<TextureAsset>,
    pub instances: Vec<SceneInstance>,
}

impl Default for SceneDescription {
    /// A brick wall with two cars parked in front of it.
    fn default() -> Self {
        let meshes = vec![
            MeshAsset {
                name: "plane".into(),
                source: MeshSource::Plane,
            },
            MeshAsset {
                name: "car".into(),
                source: MeshSource::Cube,
            },
        ];
        let texture = |name: &str, builtin, kind| TextureAsset {
            name: name.into(),
            source: TextureSource::Builtin(builtin),
            kind,
        };
        let textures = vec![
            texture("brick", BuiltinTexture::BrickColor, TextureKind::Color),
            texture("brick-normal", BuiltinTexture::BrickNormal, TextureKind::Normal),
            texture("car", BuiltinTexture::CarPaint, TextureKind::Color),
            texture("blank-normal", BuiltinTexture::FlatNormal, TextureKind::Normal),
        ];
        let instances = vec![
            SceneInstance {
                name: "ground".into(),
                mesh: 0,
                color_texture: 0,
                normal_texture: 1,
                transform: Transform {
                    position: Vec3::new(0.0, 0.0, -10.0),
                    rotation: Vec3::ZERO,
                    scale: Vec3::splat(10.0),
                },
            },
            SceneInstance {
                name: "car".into(),
                mesh: 1,
                color_texture: 2,
                normal_texture: 3,
                transform: Transform {
                    position: Vec3::new(0.0, -1.0, -10.0),
                    rotation: Vec3::new(0.0, 1.7, 0.0),
                    scale: Vec3::ONE,
                },
            },
            SceneInstance {
                name: "car-2".into(),
                mesh: 1,
                color_texture: 2,
                normal_texture: 3,
                transform: Transform {
                    position: Vec3::new(5.0, -1.0, -10.0),
                    rotation: Vec3::ZERO,
                    scale: Vec3::ONE,
                },
            },
        ];
        Self {
            meshes,
            textures,
            instances,
        }
    }
}

impl SceneDescription {
    /// Loads a scene file; relative asset paths resolve against its directory.
    pub fn load(path: &Path) -> Result<(Self, ConfigOverrides)> {
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read scene {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_xml(&xml, base_dir)
            .with_context(|| format!("failed to parse scene {}", path.display()))
    }

    /// Parses a scene document and its optional `<stereo>` settings.
    pub fn from_xml(xml: &str, base_dir: &Path) -> Result<(Self, ConfigOverrides)> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();

        let mut meshes = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("mesh")) {
            let name = required_text(&node, "name")?;
            let source = parse_mesh_source(&required_text(&node, "source")?, base_dir);
            meshes.push(MeshAsset { name, source });
        }

        let mut textures = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("texture")) {
            let name = required_text(&node, "name")?;
            let source = parse_texture_source(&required_text(&node, "source")?, base_dir)?;
            let kind = match optional_text(&node, "kind").as_deref() {
                None | Some("color") => TextureKind::Color,
                Some("normal") => TextureKind::Normal,
                Some(other) => bail!("texture {name}: unknown kind `{other}`"),
            };
            textures.push(TextureAsset { name, source, kind });
        }

        let mut instances = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("instance")) {
            let name = required_text(&node, "name")?;
            let lookup_mesh = required_text(&node, "mesh")?;
            let mesh = meshes
                .iter()
                .position(|m| m.name == lookup_mesh)
                .ok_or_else(|| anyhow!("instance {name}: unknown mesh `{lookup_mesh}`"))?;
            let color_texture = find_texture(&textures, &name, &required_text(&node, "color")?)?;
            let normal_texture =
                find_texture(&textures, &name, &required_text(&node, "normal")?)?;
            let defaults = Transform::default();
            let transform = Transform {
                position: parse_vec3(optional_text(&node, "position"), defaults.position)?,
                rotation: parse_vec3(optional_text(&node, "rotation"), defaults.rotation)?,
                scale: parse_scale(optional_text(&node, "scale"), defaults.scale)?,
            };
            instances.push(SceneInstance {
                name,
                mesh,
                color_texture,
                normal_texture,
                transform,
            });
        }

        if instances.is_empty() {
            bail!("scene does not define any <instance>");
        }

        let overrides = match root.children().find(|n| n.has_tag_name("stereo")) {
            Some(node) => parse_stereo(&node)?,
            None => ConfigOverrides::default(),
        };

        Ok((
            Self {
                meshes,
                textures,
                instances,
            },
            overrides,
        ))
    }

    /// Number of instances drawn with each mesh, in mesh order.
    #[cfg(test)]
    fn draws_per_mesh(&self) -> Vec<usize> {
        let mut counts = vec![0; self.meshes.len()];
        for instance in &self.instances {
            counts[instance.mesh] += 1;
        }
        counts
    }
}

fn find_texture(textures: &[TextureAsset], instance: &str, name: &str) -> Result<usize> {
    textures
        .iter()
        .position(|t| t.name == name)
        .ok_or_else(|| anyhow!("instance {instance}: unknown texture `{name}`"))
}

fn parse_mesh_source(value: &str, base_dir: &Path) -> MeshSource {
    match value {
        "builtin:plane" => MeshSource::Plane,
        "builtin:cube" => MeshSource::Cube,
        path => MeshSource::File(base_dir.join(path)),
    }
}

fn parse_texture_source(value: &str, base_dir: &Path) -> Result<TextureSource> {
    let Some(name) = value.strip_prefix("builtin:") else {
        return Ok(TextureSource::File(base_dir.join(value)));
    };
    let builtin = match name {
        "brick" => BuiltinTexture::BrickColor,
        "brick-normal" => BuiltinTexture::BrickNormal,
        "flat-normal" => BuiltinTexture::FlatNormal,
        "car" => BuiltinTexture::CarPaint,
        other => bail!("unknown builtin texture `{other}`"),
    };
    Ok(TextureSource::Builtin(builtin))
}

fn parse_stereo(node: &Node<'_, '_>) -> Result<ConfigOverrides> {
    let mut overrides = ConfigOverrides::default();
    if let Some(split) = optional_text(node, "split") {
        overrides.set_preset_name(&split)?;
    }
    overrides.eye_width_percent = parse_opt(node, "eye-width")?;
    overrides.second_eye_start_percent = parse_opt(node, "second-eye-start")?;
    overrides.fov_y = parse_opt(node, "fov")?;
    overrides.near = parse_opt(node, "near")?;
    overrides.far = parse_opt(node, "far")?;
    overrides.initial_offset = parse_opt(node, "offset")?;
    overrides.offset_step = parse_opt(node, "offset-step")?;
    overrides.second_eye_yaw = parse_opt(node, "yaw")?;
    overrides.window_width = parse_opt(node, "width")?;
    overrides.window_height = parse_opt(node, "height")?;
    overrides.mouse_sensitivity = parse_opt(node, "mouse-sensitivity")?;
    overrides.move_speed = parse_opt(node, "move-speed")?;
    Ok(overrides)
}

fn parse_opt<T>(node: &Node<'_, '_>, tag: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_text(node, tag)
        .map(|text| {
            text.parse::<T>()
                .map_err(|err| anyhow!("<{tag}> value `{text}` is invalid: {err}"))
        })
        .transpose()
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_numbers(value: &str) -> Result<Vec<f32>> {
    value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid number `{component}`: {err}"))
        })
        .collect()
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    match parse_numbers(&value)?.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("vector `{value}` must have three components")),
    }
}

/// Accepts either a uniform scale or three components.
fn parse_scale(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    match parse_numbers(&value)?.as_slice() {
        [s] => Ok(Vec3::splat(*s)),
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("scale `{value}` must have one or three components")),
    }
}
