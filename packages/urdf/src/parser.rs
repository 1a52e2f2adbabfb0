//! # Robot-description reader
//!
//! Two passes: quick-xml events are folded into a small element tree, which
//! is then interpreted into a `RobotDescription`. Only unreadable XML or a
//! missing `<robot>` root aborts; every other problem is collected as a
//! warning and the offending element skipped or defaulted.

use crate::description::RobotDescription;
use crate::error::ImportError;
use armature_scene::{
    default_axis, CollisionElement, Geometry, Inertia, Inertial, JointDynamics, JointFragment,
    JointLimit, JointMimic, JointType, LinkFragment, Material, Pose, VisualElement,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome of reading robot-description text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResult {
    /// `None` when the text could not be read at all
    pub robot: Option<RobotDescription>,
    pub warnings: Vec<String>,
}

/// Parse robot-description text; never fails, see `ImportResult`
pub fn parse_robot(text: &str) -> ImportResult {
    let root = match read_tree(text) {
        Ok(root) => root,
        Err(error) => {
            return ImportResult {
                robot: None,
                warnings: vec![error.to_string()],
            }
        }
    };

    let mut interpreter = Interpreter::default();
    let robot = interpreter.robot(&root);
    for warning in &interpreter.warnings {
        warn!(%warning, "Skipped robot-description element");
    }
    debug!(
        links = robot.links.len(),
        joints = robot.joints.len(),
        warnings = interpreter.warnings.len(),
        "Parsed robot description"
    );
    ImportResult {
        robot: Some(robot),
        warnings: interpreter.warnings.into_iter().map(|w| w.to_string()).collect(),
    }
}

#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, ImportError> {
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(ImportError::xml)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(ImportError::xml)?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            children: Vec::new(),
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }
}

fn read_tree(text: &str) -> Result<Element, ImportError> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().map_err(ImportError::xml)? {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => {}
                }
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None if root.is_none() => root = Some(element),
                        None => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ImportError::xml("unexpected end of input"));
    }
    match root {
        Some(root) if root.name == "robot" => Ok(root),
        _ => Err(ImportError::MissingRobot),
    }
}

#[derive(Default)]
struct Interpreter {
    materials: HashMap<String, Material>,
    warnings: Vec<ImportError>,
}

impl Interpreter {
    fn robot(&mut self, root: &Element) -> RobotDescription {
        let mut robot = RobotDescription::new(root.attr("name").unwrap_or("robot"));

        for material in root.children_named("material") {
            if let Some(material) = self.material(material) {
                self.materials.insert(material.name.clone(), material);
            }
        }
        for link in root.children_named("link") {
            match link.attr("name") {
                Some(name) if !name.is_empty() => {
                    if robot.link(name).is_some() {
                        self.warnings.push(ImportError::skipped("link", name, "duplicate name"));
                        continue;
                    }
                    let link = self.link(name, link);
                    robot.links.push(link);
                }
                _ => self.warnings.push(ImportError::missing_attribute("link", "name")),
            }
        }
        for joint in root.children_named("joint") {
            if let Some(joint) = self.joint(joint) {
                robot.joints.push(joint);
            }
        }
        robot
    }

    fn material(&mut self, element: &Element) -> Option<Material> {
        let name = element.attr("name").unwrap_or_default().to_string();
        let color = element
            .child("color")
            .and_then(|color| self.vector::<4>(color, "rgba"));
        let texture = element
            .child("texture")
            .and_then(|texture| texture.attr("filename"))
            .map(str::to_string);

        if color.is_none() && texture.is_none() {
            if name.is_empty() {
                return None;
            }
            // bare reference to a robot-level material
            return Some(self.materials.get(&name).cloned().unwrap_or(Material {
                name,
                color: None,
                texture: None,
            }));
        }
        Some(Material { name, color, texture })
    }

    fn link(&mut self, name: &str, element: &Element) -> LinkFragment {
        let mut link = LinkFragment::named(name);
        link.inertial = element.child("inertial").map(|inertial| self.inertial(inertial));

        for visual in element.children_named("visual") {
            let Some(geometry) = self.geometry(visual, name) else {
                continue;
            };
            let material = visual.child("material").and_then(|m| self.material(m));
            link.visuals.push(VisualElement {
                name: visual.attr("name").map(str::to_string),
                origin: self.origin(visual),
                geometry,
                material,
            });
        }
        for collision in element.children_named("collision") {
            let Some(geometry) = self.geometry(collision, name) else {
                continue;
            };
            link.collisions.push(CollisionElement {
                name: collision.attr("name").map(str::to_string),
                origin: self.origin(collision),
                geometry,
            });
        }
        link
    }

    fn inertial(&mut self, element: &Element) -> Inertial {
        let mass = element
            .child("mass")
            .map(|mass| self.number(mass, "value", 0.0))
            .unwrap_or(0.0);
        let inertia = element
            .child("inertia")
            .map(|inertia| Inertia {
                ixx: self.number(inertia, "ixx", 0.0),
                ixy: self.number(inertia, "ixy", 0.0),
                ixz: self.number(inertia, "ixz", 0.0),
                iyy: self.number(inertia, "iyy", 0.0),
                iyz: self.number(inertia, "iyz", 0.0),
                izz: self.number(inertia, "izz", 0.0),
            })
            .unwrap_or_default();
        Inertial {
            origin: self.origin(element),
            mass,
            inertia,
        }
    }

    fn geometry(&mut self, owner: &Element, link: &str) -> Option<Geometry> {
        let shape = owner.child("geometry").and_then(|geometry| geometry.children.first());
        let Some(shape) = shape else {
            self.warnings
                .push(ImportError::skipped(owner.name.as_str(), link, "missing geometry"));
            return None;
        };
        let geometry = match shape.name.as_str() {
            "box" => Geometry::Box {
                size: self.vector::<3>(shape, "size").unwrap_or([0.0; 3]),
            },
            "sphere" => Geometry::Sphere {
                radius: self.number(shape, "radius", 0.0),
            },
            "cylinder" => Geometry::Cylinder {
                radius: self.number(shape, "radius", 0.0),
                length: self.number(shape, "length", 0.0),
            },
            "mesh" => Geometry::Mesh {
                filename: shape.attr("filename").unwrap_or_default().to_string(),
                scale: self.vector::<3>(shape, "scale"),
            },
            other => {
                self.warnings.push(ImportError::skipped(
                    owner.name.as_str(),
                    link,
                    format!("unsupported geometry <{}>", other),
                ));
                return None;
            }
        };
        Some(geometry)
    }

    fn joint(&mut self, element: &Element) -> Option<JointFragment> {
        let mut required = |key: &str, value: Option<&str>| -> Option<String> {
            match value {
                Some(value) if !value.is_empty() => Some(value.to_string()),
                _ => {
                    self.warnings.push(ImportError::missing_attribute("joint", key));
                    None
                }
            }
        };
        let name = required("name", element.attr("name"))?;
        let tag = required("type", element.attr("type"))?;
        let parent = required("parent", element.child("parent").and_then(|p| p.attr("link")))?;
        let child = required("child", element.child("child").and_then(|c| c.attr("link")))?;

        let Some(joint_type) = JointType::parse(&tag) else {
            self.warnings
                .push(ImportError::skipped("joint", name, format!("unknown type {:?}", tag)));
            return None;
        };

        let mut joint = JointFragment::new(name, joint_type).between(parent, child);
        joint.origin = self.origin(element);
        joint.axis = element
            .child("axis")
            .and_then(|axis| self.vector::<3>(axis, "xyz"))
            .unwrap_or_else(default_axis);
        joint.limit = element.child("limit").map(|limit| JointLimit {
            lower: self.number(limit, "lower", 0.0),
            upper: self.number(limit, "upper", 0.0),
            effort: self.number(limit, "effort", 0.0),
            velocity: self.number(limit, "velocity", 0.0),
        });
        joint.dynamics = element.child("dynamics").map(|dynamics| JointDynamics {
            damping: self.number(dynamics, "damping", 0.0),
            friction: self.number(dynamics, "friction", 0.0),
        });
        joint.mimic = element.child("mimic").and_then(|mimic| {
            let target = mimic.attr("joint")?.to_string();
            Some(JointMimic {
                joint: target,
                multiplier: self.number(mimic, "multiplier", 1.0),
                offset: self.number(mimic, "offset", 0.0),
            })
        });
        Some(joint)
    }

    /// `<origin xyz rpy>` child of `element`, zero pose when absent
    fn origin(&mut self, element: &Element) -> Pose {
        match element.child("origin") {
            Some(origin) => Pose::new(
                self.vector::<3>(origin, "xyz").unwrap_or([0.0; 3]),
                self.vector::<3>(origin, "rpy").unwrap_or([0.0; 3]),
            ),
            None => Pose::default(),
        }
    }

    fn number(&mut self, element: &Element, attribute: &str, default: f64) -> f64 {
        let Some(text) = element.attr(attribute) else {
            return default;
        };
        match text.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            _ => {
                self.invalid(element, attribute, text);
                default
            }
        }
    }

    /// Whitespace-separated list of exactly `N` numbers
    fn vector<const N: usize>(&mut self, element: &Element, attribute: &str) -> Option<[f64; N]> {
        let text = element.attr(attribute)?;
        let values: Result<Vec<f64>, _> = text.split_whitespace().map(str::parse::<f64>).collect();
        match values {
            Ok(values) if values.len() == N && values.iter().all(|v| v.is_finite()) => {
                let mut out = [0.0; N];
                out.copy_from_slice(&values);
                Some(out)
            }
            _ => {
                self.invalid(element, attribute, text);
                None
            }
        }
    }

    fn invalid(&mut self, element: &Element, attribute: &str, value: &str) {
        self.warnings.push(ImportError::InvalidNumber {
            element: element.name.clone(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARM: &str = r#"<?xml version="1.0"?>
<robot name="arm">
  <material name="steel">
    <color rgba="0.6 0.6 0.6 1"/>
  </material>
  <link name="base">
    <inertial>
      <origin xyz="0 0 0.05" rpy="0 0 0"/>
      <mass value="2.5"/>
      <inertia ixx="0.1" ixy="0" ixz="0" iyy="0.2" iyz="0" izz="0.3"/>
    </inertial>
    <visual name="shell">
      <origin xyz="0 0 0.1"/>
      <geometry><box size="0.2 0.2 0.1"/></geometry>
      <material name="steel"/>
    </visual>
    <collision>
      <geometry><cylinder radius="0.1" length="0.2"/></geometry>
    </collision>
  </link>
  <link name="upper"/>
  <joint name="shoulder" type="revolute">
    <parent link="base"/>
    <child link="upper"/>
    <origin xyz="0 0 0.2" rpy="0 0 1.5708"/>
    <axis xyz="0 1 0"/>
    <limit lower="-1.57" upper="1.57" effort="10" velocity="2"/>
  </joint>
  <joint name="broken" type="fixed">
    <parent link="base"/>
  </joint>
</robot>"#;

    #[test]
    fn test_parse_links_and_joints() {
        let result = parse_robot(ARM);
        let robot = result.robot.unwrap();
        assert_eq!(robot.name, "arm");
        assert_eq!(robot.links.len(), 2);
        assert_eq!(robot.joints.len(), 1);

        let base = robot.link("base").unwrap();
        let inertial = base.inertial.unwrap();
        assert_eq!(inertial.mass, 2.5);
        assert_eq!(inertial.origin.xyz, [0.0, 0.0, 0.05]);
        assert_eq!(inertial.inertia.izz, 0.3);
        assert_eq!(base.visuals[0].name.as_deref(), Some("shell"));
        assert_eq!(base.visuals[0].geometry, Geometry::Box { size: [0.2, 0.2, 0.1] });
        assert_eq!(
            base.collisions[0].geometry,
            Geometry::Cylinder {
                radius: 0.1,
                length: 0.2
            }
        );

        let shoulder = robot.joint("shoulder").unwrap();
        assert_eq!(shoulder.joint_type, JointType::Revolute);
        assert_eq!(shoulder.parent, "base");
        assert_eq!(shoulder.child, "upper");
        assert_eq!(shoulder.axis, [0.0, 1.0, 0.0]);
        assert_eq!(shoulder.limit.unwrap().effort, 10.0);
    }

    #[test]
    fn test_robot_level_material_is_resolved() {
        let robot = parse_robot(ARM).robot.unwrap();
        let material = robot.link("base").unwrap().visuals[0].material.clone().unwrap();
        assert_eq!(material.name, "steel");
        assert_eq!(material.color, Some([0.6, 0.6, 0.6, 1.0]));
    }

    #[test]
    fn test_incomplete_joint_is_dropped_with_warning() {
        let result = parse_robot(ARM);
        assert!(result.warnings.iter().any(|w| w.contains("child")));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let text =
            r#"<robot name="r"><link name="l"><inertial><mass value="heavy"/></inertial></link></robot>"#;
        let result = parse_robot(text);
        let robot = result.robot.unwrap();
        assert_eq!(robot.links[0].inertial.unwrap().mass, 0.0);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_unreadable_text_yields_no_robot() {
        let result = parse_robot("<robot><link></robot>");
        assert!(result.robot.is_none());
        assert!(!result.warnings.is_empty());

        let result = parse_robot("<model name=\"x\"/>");
        assert!(result.robot.is_none());
        assert_eq!(result.warnings, vec![ImportError::MissingRobot.to_string()]);
    }

    #[test]
    fn test_mimic_is_read() {
        let text = r#"<robot name="g">
  <link name="a"/><link name="b"/><link name="c"/>
  <joint name="left" type="prismatic"><parent link="a"/><child link="b"/></joint>
  <joint name="right" type="prismatic"><parent link="a"/><child link="c"/>
    <mimic joint="left" multiplier="-1"/>
  </joint>
</robot>"#;
        let robot = parse_robot(text).robot.unwrap();
        let mimic = robot.joint("right").unwrap().mimic.clone().unwrap();
        assert_eq!(mimic.joint, "left");
        assert_eq!(mimic.multiplier, -1.0);
        assert_eq!(mimic.offset, 0.0);
    }
}
