//! Project and target records.

use crate::cascade::{Child, Parent};
use crate::entity::{Entity, Reference};
use crate::projection::{IndexRecord, Indexable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to a project.
///
/// Only `resource_id` identifies the project. `name` is copied when the
/// reference is made and is not rewritten when the project is renamed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRef {
    /// Resource id.
    pub resource_id: String,
    /// Project name.
    pub name: String,
}

impl ProjectRef {
    /// Reference by resource id alone.
    pub fn by_id(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            name: String::new(),
        }
    }
}

/// Reference to a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetRef {
    /// Resource id.
    pub resource_id: String,
    /// Target name.
    pub name: String,
    /// Owning project.
    pub project: Option<ProjectRef>,
}

impl TargetRef {
    /// Reference by resource id within a project.
    pub fn new(resource_id: impl Into<String>, project: ProjectRef) -> Self {
        Self {
            resource_id: resource_id.into(),
            name: String::new(),
            project: Some(project),
        }
    }
}

/// Lifecycle state of a target as last reported by its provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetState {
    /// Never reported.
    #[default]
    Unknown,
    /// Known but not yet created.
    NotCreated,
    /// Being created or changed.
    Pending,
    /// Up.
    Running,
    /// Halted.
    Stopped,
    /// Torn down.
    Destroyed,
}

/// A project: the parent of a set of targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    /// Resource id, assigned on first put.
    pub resource_id: String,
    /// Project name.
    pub name: String,
    /// Project root on disk.
    pub path: String,
    /// Targets of this project. Maintained by target puts and deletes.
    pub targets: Vec<TargetRef>,
}

impl Project {
    /// A new, unsaved project.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }
}

/// A machine managed inside a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Target {
    /// Resource id, assigned on first put.
    pub resource_id: String,
    /// Target name, unique only by convention.
    pub name: String,
    /// Owning project.
    pub project: Option<ProjectRef>,
    /// Last reported state.
    pub state: TargetState,
    /// Provider machine id.
    pub uuid: String,
    /// Free-form labels.
    pub labels: BTreeMap<String, String>,
    /// Opaque provider configuration, stored as a CBOR byte string.
    #[serde(with = "serde_bytes")]
    pub configuration: Vec<u8>,
}

impl Target {
    /// A new, unsaved target in `project`.
    pub fn new(name: impl Into<String>, project: ProjectRef) -> Self {
        Self {
            name: name.into(),
            project: Some(project),
            ..Self::default()
        }
    }
}

impl Indexable for ProjectRef {
    fn index_record(&self) -> IndexRecord {
        IndexRecord::new(&self.resource_id, &self.name, "")
    }
}

impl Indexable for Project {
    fn index_record(&self) -> IndexRecord {
        IndexRecord::new(&self.resource_id, &self.name, "")
    }
}

fn project_id(project: Option<&ProjectRef>) -> &str {
    project.map_or("", |p| p.resource_id.as_str())
}

impl Indexable for TargetRef {
    fn index_record(&self) -> IndexRecord {
        IndexRecord::new(
            &self.resource_id,
            &self.name,
            project_id(self.project.as_ref()),
        )
    }
}

impl Indexable for Target {
    fn index_record(&self) -> IndexRecord {
        IndexRecord::new(
            &self.resource_id,
            &self.name,
            project_id(self.project.as_ref()),
        )
    }
}

impl Reference for ProjectRef {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Reference for TargetRef {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Entity for Project {
    const KIND: &'static str = "Project";
    const BUCKET: &'static str = "project";
    const TABLE: &'static str = "project-index";

    type Ref = ProjectRef;

    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn set_resource_id(&mut self, id: String) {
        self.resource_id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn to_ref(&self) -> ProjectRef {
        ProjectRef {
            resource_id: self.resource_id.clone(),
            name: self.name.clone(),
        }
    }

    fn ref_from_index(row: &IndexRecord) -> ProjectRef {
        ProjectRef {
            resource_id: row.id.clone(),
            name: row.name.clone(),
        }
    }
}

impl Entity for Target {
    const KIND: &'static str = "Target";
    const BUCKET: &'static str = "target";
    const TABLE: &'static str = "target-index";

    type Ref = TargetRef;

    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn set_resource_id(&mut self, id: String) {
        self.resource_id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn to_ref(&self) -> TargetRef {
        TargetRef {
            resource_id: self.resource_id.clone(),
            name: self.name.clone(),
            project: self.project.clone(),
        }
    }

    fn ref_from_index(row: &IndexRecord) -> TargetRef {
        TargetRef {
            resource_id: row.id.clone(),
            name: row.name.clone(),
            project: (!row.parent_id.is_empty()).then(|| ProjectRef::by_id(&row.parent_id)),
        }
    }
}

impl Parent<Target> for Project {
    fn add_child(&mut self, child: &Target) -> bool {
        if self
            .targets
            .iter()
            .any(|t| t.resource_id == child.resource_id)
        {
            return false;
        }
        self.targets.push(TargetRef {
            resource_id: child.resource_id.clone(),
            name: child.name.clone(),
            project: None,
        });
        true
    }

    fn remove_child(&mut self, child: &TargetRef) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t.resource_id != child.resource_id);
        self.targets.len() != before
    }

    fn children(&self) -> Vec<TargetRef> {
        let parent = self.to_ref();
        self.targets
            .iter()
            .map(|t| TargetRef {
                resource_id: t.resource_id.clone(),
                name: t.name.clone(),
                project: Some(parent.clone()),
            })
            .collect()
    }

    fn inherit_children(&mut self, stored: Option<&Self>) {
        self.targets = stored.map(|p| p.targets.clone()).unwrap_or_default();
    }
}

impl Child for Target {
    type Parent = Project;

    fn parent_ref(&self) -> Option<&ProjectRef> {
        self.project.as_ref()
    }

    fn parent_of_ref(reference: &TargetRef) -> Option<&ProjectRef> {
        reference.project.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, name: &str) -> Target {
        Target {
            resource_id: id.into(),
            ..Target::new(name, ProjectRef::by_id("prj-1"))
        }
    }

    #[test]
    fn record_and_reference_project_alike() {
        let t = target("tgt-1", "web");
        assert_eq!(IndexRecord::from(&t), IndexRecord::from(&t.to_ref()));
        assert_eq!(IndexRecord::from(&t), IndexRecord::new("tgt-1", "web", "prj-1"));

        let p = Project {
            resource_id: "prj-1".into(),
            ..Project::new("demo", "/work/demo")
        };
        assert_eq!(p.index_record(), p.to_ref().index_record());
        assert_eq!(p.index_record().parent_id, "");
    }

    #[test]
    fn add_child_is_a_set_insert() {
        let mut p = Project::new("demo", "/work/demo");
        let t = target("tgt-1", "web");
        assert!(p.add_child(&t));
        assert!(!p.add_child(&t));
        assert_eq!(p.targets.len(), 1);
    }

    #[test]
    fn remove_child_by_id() {
        let mut p = Project::new("demo", "/work/demo");
        p.add_child(&target("tgt-1", "web"));
        p.add_child(&target("tgt-2", "db"));

        let by_id = TargetRef::new("tgt-1", ProjectRef::by_id("prj-1"));
        assert!(p.remove_child(&by_id));
        assert!(!p.remove_child(&by_id));
        assert_eq!(p.targets.len(), 1);
        assert_eq!(p.targets[0].resource_id, "tgt-2");
    }

    #[test]
    fn children_point_at_parent() {
        let mut p = Project {
            resource_id: "prj-1".into(),
            ..Project::new("demo", "/work/demo")
        };
        p.add_child(&target("tgt-1", "web"));
        let children = p.children();
        assert_eq!(children[0].project.as_ref().unwrap().resource_id, "prj-1");
        assert_eq!(Target::parent_of_ref(&children[0]), Some(&p.to_ref()));
    }

    #[test]
    fn listing_reference_from_index_row() {
        let r = Target::ref_from_index(&IndexRecord::new("tgt-1", "web", "prj-1"));
        assert_eq!(r.project, Some(ProjectRef::by_id("prj-1")));
        let r = Project::ref_from_index(&IndexRecord::new("prj-1", "demo", ""));
        assert_eq!(r.name, "demo");
    }

    #[test]
    fn target_encodes_and_decodes() {
        let mut t = target("tgt-1", "web");
        t.state = TargetState::Running;
        t.labels.insert("role".into(), "frontend".into());
        t.configuration = vec![0, 1, 2, 255];

        let bytes = berth_codec::encode(&t).unwrap();
        let back: Target = berth_codec::decode(&bytes).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn missing_fields_take_defaults() {
        #[derive(Serialize)]
        struct Minimal {
            resource_id: &'static str,
            name: &'static str,
        }
        let bytes = berth_codec::encode(&Minimal {
            resource_id: "tgt-1",
            name: "web",
        })
        .unwrap();
        let t: Target = berth_codec::decode(&bytes).unwrap();
        assert_eq!(t.state, TargetState::Unknown);
        assert!(t.project.is_none());
        assert!(t.configuration.is_empty());
    }

    #[test]
    fn configuration_is_a_byte_string() {
        let mut t = target("tgt-1", "web");
        t.configuration = vec![0, 1, 2, 255];
        let bytes = berth_codec::encode(&t).unwrap();
        assert!(bytes.windows(5).any(|w| w == [0x44, 0, 1, 2, 255]));
    }

    fn target_state() -> impl proptest::strategy::Strategy<Value = TargetState> {
        proptest::prop_oneof![
            proptest::strategy::Just(TargetState::Unknown),
            proptest::strategy::Just(TargetState::Pending),
            proptest::strategy::Just(TargetState::Running),
            proptest::strategy::Just(TargetState::Destroyed),
        ]
    }

    proptest::proptest! {
        #[test]
        fn records_survive_encoding(
            name in "[a-zA-Z0-9-]{0,12}",
            state in target_state(),
            labels in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..4),
            configuration in proptest::collection::vec(proptest::arbitrary::any::<u8>(), 0..96),
        ) {
            let mut t = target("tgt-1", &name);
            t.state = state;
            t.labels = labels;
            t.configuration = configuration;
            let bytes = berth_codec::encode(&t).unwrap();
            proptest::prop_assert_eq!(berth_codec::encode(&t).unwrap(), bytes.clone());
            let back: Target = berth_codec::decode(&bytes).unwrap();
            proptest::prop_assert_eq!(back, t.clone());

            let mut p = Project::new(name.clone(), format!("/work/{name}"));
            p.add_child(&t);
            let back: Project = berth_codec::decode(&berth_codec::encode(&p).unwrap()).unwrap();
            proptest::prop_assert_eq!(back, p);
        }
    }
}
