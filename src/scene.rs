use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;

/// Scene description loaded from XML.
///
/// ```xml
/// <scene>
///   <settings>
///     <width>640</width>
///     <shadow_map_size>2048</shadow_map_size>
///     <ambient>0.25</ambient>
///   </settings>
///   <object>
///     <name>Floor</name>
///     <type>plane</type>
///     <size>10 0 10</size>
///     <color>128 128 128</color>
///   </object>
/// </scene>
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    pub settings: RenderConfig,
    pub objects: Vec<SceneObject>,
    /// Directory OBJ paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Scene {
    /// Parses the scene XML; relative mesh paths resolve against the
    /// working directory.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();

        let settings = match root.children().find(|n| n.has_tag_name("settings")) {
            Some(node) => parse_settings(&node).context("invalid <settings> block")?,
            None => RenderConfig::default(),
        };

        let objects = root
            .descendants()
            .filter(|n| n.has_tag_name("object"))
            .enumerate()
            .map(|(index, node)| {
                parse_object(&node).with_context(|| format!("invalid <object> #{}", index + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            settings,
            objects,
            base_dir: None,
        })
    }

    /// Reads a scene file; mesh paths resolve against its directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("unable to read scene {}", path.display()))?;
        let mut scene = Self::from_xml(&xml)
            .with_context(|| format!("failed to parse scene {}", path.display()))?;
        scene.base_dir = path.parent().map(Path::to_path_buf);
        Ok(scene)
    }

    pub fn find(&self, kind: ObjectKind) -> Option<&SceneObject> {
        self.objects.iter().find(|object| object.kind == kind)
    }

    /// Objects that produce draw calls.
    pub fn drawables(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter().filter(|object| object.kind.is_drawable())
    }

    pub fn resolve_mesh_path(&self, mesh: &str) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.join(mesh),
            None => PathBuf::from(mesh),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Plane,
    Cube,
    Mesh,
    Camera,
    Light,
}

impl ObjectKind {
    pub fn is_drawable(self) -> bool {
        matches!(self, Self::Plane | Self::Cube | Self::Mesh)
    }
}

/// Scene object as written in the XML.
///
/// `rotation` holds Euler angles in degrees applied Z, then Y, then X.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// OBJ file for [`ObjectKind::Mesh`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    /// Box extents for cubes; planes use `x` and `z`.
    #[serde(default = "default_size")]
    pub size: Vec3,
    #[serde(default = "default_color")]
    pub color: Vec3,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    /// Camera fov, and light fov for perspective shadow frustums.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fov: Option<f32>,
    /// Light point of aim; overrides `rotation` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<ProjectionKind>,
    /// Half extent of an orthographic shadow frustum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<f32>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            mesh: None,
            size: default_size(),
            color: default_color(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: default_scale(),
            fov: None,
            target: None,
            projection: None,
            extent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionKind {
    Orthographic,
    Perspective,
}

fn default_size() -> Vec3 {
    Vec3::ONE
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn parse_object(node: &Node<'_, '_>) -> Result<SceneObject> {
    let name = required_text(node, "name")?;
    let kind = match optional_text(node, "type") {
        Some(text) => parse_keyword(&text).context("unknown object <type>")?,
        None => ObjectKind::Mesh,
    };
    let mut object = SceneObject::new(name, kind);
    object.mesh = optional_text(node, "mesh");
    object.size = parse_vec3(optional_text(node, "size"), object.size).context("bad <size>")?;
    object.color = parse_color(optional_text(node, "color"), object.color).context("bad <color>")?;
    object.position =
        parse_vec3(optional_text(node, "position"), object.position).context("bad <position>")?;
    object.rotation =
        parse_vec3(optional_text(node, "rotation"), object.rotation).context("bad <rotation>")?;
    object.scale = parse_vec3(optional_text(node, "scale"), object.scale).context("bad <scale>")?;
    object.fov = optional_text(node, "fov")
        .map(|text| parse_f32(&text))
        .transpose()
        .context("bad <fov>")?;
    object.target = optional_text(node, "target")
        .map(|text| parse_vec3(Some(text), Vec3::ZERO))
        .transpose()
        .context("bad <target>")?;
    object.projection = optional_text(node, "projection")
        .map(|text| parse_keyword(&text))
        .transpose()
        .context("unknown <projection>")?;
    object.extent = optional_text(node, "extent")
        .map(|text| parse_f32(&text))
        .transpose()
        .context("bad <extent>")?;

    if kind == ObjectKind::Mesh && object.mesh.is_none() {
        return Err(anyhow!("mesh object `{}` has no <mesh> path", object.name));
    }
    Ok(object)
}

fn parse_settings(node: &Node<'_, '_>) -> Result<RenderConfig> {
    let mut config = RenderConfig::default();
    let u32_field = |tag: &str, default: u32| -> Result<u32> {
        match optional_text(node, tag) {
            Some(text) => text
                .parse::<u32>()
                .with_context(|| format!("<{tag}> must be a non-negative integer")),
            None => Ok(default),
        }
    };
    let f32_field = |tag: &str, default: f32| -> Result<f32> {
        match optional_text(node, tag) {
            Some(text) => parse_f32(&text).with_context(|| format!("bad <{tag}>")),
            None => Ok(default),
        }
    };

    config.width = u32_field("width", config.width)?;
    config.height = u32_field("height", config.height)?;
    config.shadow_map_size = u32_field("shadow_map_size", config.shadow_map_size)?;
    config.shading.ambient = f32_field("ambient", config.shading.ambient)?;
    config.depth_bias.constant = f32_field("bias_constant", config.depth_bias.constant)?;
    config.depth_bias.slope_scale = f32_field("bias_slope_scale", config.depth_bias.slope_scale)?;
    config.depth_bias.clamp = f32_field("bias_clamp", config.depth_bias.clamp)?;
    if let Some(text) = optional_text(node, "cull_mode") {
        config.main_cull_mode = parse_keyword(&text).context("unknown <cull_mode>")?;
    }
    if let Some(text) = optional_text(node, "filter") {
        config.sampler.filter = parse_keyword(&text).context("unknown <filter>")?;
    }
    if let Some(text) = optional_text(node, "address_mode") {
        config.sampler.address_mode = parse_keyword(&text).context("unknown <address_mode>")?;
    }
    if let Some(text) = optional_text(node, "clear_color") {
        config.clear_color = parse_color(Some(text), Vec3::ZERO)?.extend(1.0);
    }
    Ok(config)
}

/// Deserializes a unit enum variant from its serde name.
fn parse_keyword<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T> {
    T::deserialize(StrDeserializer::<ValueError>::new(text))
        .map_err(|err| anyhow!("`{text}`: {err}"))
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
        .map(str::to_string)
}

fn parse_components(text: &str) -> Result<Vec3> {
    let numbers = text
        .split_whitespace()
        .map(parse_f32)
        .collect::<Result<Vec<_>>>()?;
    match numbers[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => Err(anyhow!("expected 3 components, found {}", numbers.len())),
    }
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    value.map_or(Ok(default), |text| parse_components(&text))
}

/// Colours are written as 0-255 channels.
fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    value.map_or(Ok(default), |text| {
        parse_components(&text).map(|channels| channels / 255.0)
    })
}

fn parse_f32(text: &str) -> Result<f32> {
    text.parse::<f32>()
        .map_err(|err| anyhow!("failed to parse float `{text}`: {err}"))
}
