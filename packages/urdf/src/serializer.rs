//! # Robot-description writer
//!
//! Emits a `RobotDescription` as indented XML with canonical numbers.

use crate::description::RobotDescription;
use crate::error::{ExportError, ExportResult};
use crate::format::{format_number, format_vector};
use armature_scene::{Geometry, Inertial, JointFragment, JointType, LinkFragment, Material, Pose};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

pub fn write_robot(robot: &RobotDescription) -> ExportResult<String> {
    let mut out = XmlOut::new();
    out.decl()?;

    out.open("robot", &[("name", robot.name.clone())])?;
    for link in &robot.links {
        write_link(&mut out, link)?;
    }
    for joint in &robot.joints {
        write_joint(&mut out, joint)?;
    }
    out.close("robot")?;

    out.finish()
}

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn emit(&mut self, event: Event<'_>) -> ExportResult<()> {
        self.writer.write_event(event).map_err(ExportError::write)
    }

    fn decl(&mut self) -> ExportResult<()> {
        self.emit(Event::Decl(BytesDecl::new("1.0", None, None)))
    }

    fn start<'a>(name: &'a str, attributes: &'a [(&'a str, String)]) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        for (key, value) in attributes {
            start.push_attribute((*key, value.as_str()));
        }
        start
    }

    fn open(&mut self, name: &str, attributes: &[(&str, String)]) -> ExportResult<()> {
        self.emit(Event::Start(Self::start(name, attributes)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, String)]) -> ExportResult<()> {
        self.emit(Event::Empty(Self::start(name, attributes)))
    }

    fn close(&mut self, name: &str) -> ExportResult<()> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn finish(self) -> ExportResult<String> {
        let mut text = String::from_utf8(self.writer.into_inner()).map_err(ExportError::write)?;
        text.push('\n');
        Ok(text)
    }
}

fn write_origin(out: &mut XmlOut, pose: &Pose) -> ExportResult<()> {
    out.empty(
        "origin",
        &[("xyz", format_vector(&pose.xyz)), ("rpy", format_vector(&pose.rpy))],
    )
}

fn write_link(out: &mut XmlOut, link: &LinkFragment) -> ExportResult<()> {
    let name = [("name", link.name.clone())];
    if link.inertial.is_none() && link.visuals.is_empty() && link.collisions.is_empty() {
        return out.empty("link", &name);
    }

    out.open("link", &name)?;
    if let Some(inertial) = &link.inertial {
        write_inertial(out, inertial)?;
    }
    for visual in &link.visuals {
        out.open("visual", &optional_name(visual.name.as_deref()))?;
        write_origin(out, &visual.origin)?;
        write_geometry(out, &visual.geometry)?;
        if let Some(material) = &visual.material {
            write_material(out, material)?;
        }
        out.close("visual")?;
    }
    for collision in &link.collisions {
        out.open("collision", &optional_name(collision.name.as_deref()))?;
        write_origin(out, &collision.origin)?;
        write_geometry(out, &collision.geometry)?;
        out.close("collision")?;
    }
    out.close("link")
}

fn optional_name(name: Option<&str>) -> Vec<(&'static str, String)> {
    name.map(|name| vec![("name", name.to_string())]).unwrap_or_default()
}

fn write_inertial(out: &mut XmlOut, inertial: &Inertial) -> ExportResult<()> {
    let i = &inertial.inertia;
    out.open("inertial", &[])?;
    write_origin(out, &inertial.origin)?;
    out.empty("mass", &[("value", format_number(inertial.mass))])?;
    out.empty(
        "inertia",
        &[
            ("ixx", format_number(i.ixx)),
            ("ixy", format_number(i.ixy)),
            ("ixz", format_number(i.ixz)),
            ("iyy", format_number(i.iyy)),
            ("iyz", format_number(i.iyz)),
            ("izz", format_number(i.izz)),
        ],
    )?;
    out.close("inertial")
}

fn write_geometry(out: &mut XmlOut, geometry: &Geometry) -> ExportResult<()> {
    out.open("geometry", &[])?;
    match geometry {
        Geometry::Box { size } => out.empty("box", &[("size", format_vector(size))])?,
        Geometry::Sphere { radius } => out.empty("sphere", &[("radius", format_number(*radius))])?,
        Geometry::Cylinder { radius, length } => out.empty(
            "cylinder",
            &[("radius", format_number(*radius)), ("length", format_number(*length))],
        )?,
        Geometry::Mesh { filename, scale } => {
            let mut attributes = vec![("filename", filename.clone())];
            if let Some(scale) = scale {
                attributes.push(("scale", format_vector(scale)));
            }
            out.empty("mesh", &attributes)?
        }
    }
    out.close("geometry")
}

fn write_material(out: &mut XmlOut, material: &Material) -> ExportResult<()> {
    let name = [("name", material.name.clone())];
    if material.color.is_none() && material.texture.is_none() {
        return out.empty("material", &name);
    }
    out.open("material", &name)?;
    if let Some(color) = &material.color {
        out.empty("color", &[("rgba", format_vector(color))])?;
    }
    if let Some(texture) = &material.texture {
        out.empty("texture", &[("filename", texture.clone())])?;
    }
    out.close("material")
}

fn write_joint(out: &mut XmlOut, joint: &JointFragment) -> ExportResult<()> {
    out.open(
        "joint",
        &[("name", joint.name.clone()), ("type", joint.joint_type.as_str().to_string())],
    )?;
    write_origin(out, &joint.origin)?;
    out.empty("parent", &[("link", joint.parent.clone())])?;
    out.empty("child", &[("link", joint.child.clone())])?;
    if joint.joint_type != JointType::Fixed {
        out.empty("axis", &[("xyz", format_vector(&joint.axis))])?;
    }
    if let Some(limit) = &joint.limit {
        out.empty(
            "limit",
            &[
                ("lower", format_number(limit.lower)),
                ("upper", format_number(limit.upper)),
                ("effort", format_number(limit.effort)),
                ("velocity", format_number(limit.velocity)),
            ],
        )?;
    }
    if let Some(dynamics) = &joint.dynamics {
        out.empty(
            "dynamics",
            &[
                ("damping", format_number(dynamics.damping)),
                ("friction", format_number(dynamics.friction)),
            ],
        )?;
    }
    if let Some(mimic) = &joint.mimic {
        out.empty(
            "mimic",
            &[
                ("joint", mimic.joint.clone()),
                ("multiplier", format_number(mimic.multiplier)),
                ("offset", format_number(mimic.offset)),
            ],
        )?;
    }
    out.close("joint")
}
