use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectFamily {
    pub family_label: String,
    pub project_name: String,
}

impl ProjectFamily {
    pub fn new(family_label: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self { family_label: family_label.into(), project_name: project_name.into() }
    }
}

/// Student project graph as returned by the scheduling platform. Each node is a family;
/// each item points at either a goal or a course project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGraph {
    pub nodes: Vec<GraphNode>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub label: String,
    pub items: Vec<GraphItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphItem {
    pub goal: Option<GraphProject>,
    pub course: Option<GraphProject>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphProject {
    pub project_name: String,
}

impl GraphItem {
    /// Goal name wins over course name; blank names are ignored.
    pub fn project_name(&self) -> Option<&str> {
        let goal = self.goal.as_ref().map(|goal| goal.project_name.as_str());
        let course = self.course.as_ref().map(|course| course.project_name.as_str());
        goal.filter(|name| !name.is_empty()).or_else(|| course.filter(|name| !name.is_empty()))
    }
}

impl ProjectGraph {
    pub fn family_labels(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.label.as_str()).collect()
    }

    pub fn projects_in_family(&self, family_label: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .find(|node| node.label == family_label)
            .map(|node| node.items.iter().filter_map(GraphItem::project_name).collect())
            .unwrap_or_default()
    }
}

/// Flattens the graph into `(family, project)` pairs, preserving graph order.
pub fn extract_families(graph: &ProjectGraph) -> Vec<ProjectFamily> {
    graph
        .nodes
        .iter()
        .flat_map(|node| {
            node.items
                .iter()
                .filter_map(GraphItem::project_name)
                .map(move |project| ProjectFamily::new(node.label.clone(), project))
        })
        .collect()
}
