use armature_scene::{JointFragment, LinkFragment};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// In-memory robot description: named links plus ordered joints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotDescription {
    pub name: String,
    pub links: Vec<LinkFragment>,
    pub joints: Vec<JointFragment>,
}

impl RobotDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn link(&self, name: &str) -> Option<&LinkFragment> {
        self.links.iter().find(|link| link.name == name)
    }

    pub fn joint(&self, name: &str) -> Option<&JointFragment> {
        self.joints.iter().find(|joint| joint.name == name)
    }

    /// Links that are nobody's joint child, in declaration order
    pub fn root_links(&self) -> Vec<&LinkFragment> {
        let children: HashSet<&str> =
            self.joints.iter().map(|joint| joint.child.as_str()).collect();
        self.links
            .iter()
            .filter(|link| !children.contains(link.name.as_str()))
            .collect()
    }

    /// Joints whose parent is `link`, in declaration order
    pub fn joints_from<'a>(
        &'a self,
        link: &'a str,
    ) -> impl Iterator<Item = &'a JointFragment> + 'a {
        self.joints.iter().filter(move |joint| joint.parent == link)
    }
}
