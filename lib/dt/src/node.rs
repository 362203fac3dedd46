use crate::prop::{Property, PropertyError};
use alloc::{boxed::Box, string::String, vec, vec::Vec};

/// An in-memory hierarchical descriptor. Nodes live in one container and
/// refer to each other by index; the root is its own parent.
#[derive(Debug, Clone)]
pub struct DeviceTree {
    pub root_id: usize,
    pub container: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: usize,
    pub parent_id: usize,
    pub full_name: Box<str>,
    pub node_name: Box<str>,
    pub unit_addr: Box<str>,
    pub children: Vec<usize>,
    pub props: Vec<Property>,
}

impl Node {
    fn new(node_id: usize, parent_id: usize, full_name: &str) -> Node {
        let (node_name, unit_addr) = match full_name.split_once('@') {
            Some((name, addr)) => (name, addr),
            None => (full_name, ""),
        };
        Node {
            node_id,
            parent_id,
            full_name: Box::from(full_name),
            node_name: Box::from(node_name),
            unit_addr: Box::from(unit_addr),
            children: vec![],
            props: vec![],
        }
    }

    pub fn property(&self, name: impl AsRef<str>) -> Option<&Property> {
        let name = name.as_ref();
        self.props.iter().find(|prop| prop.name.as_ref() == name)
    }

    /// Look up a mandatory property.
    pub fn require(&self, name: impl AsRef<str>) -> Result<&Property, PropertyError> {
        self.property(name).ok_or(PropertyError::PropNotFound)
    }

    /// Entries of the `compatible` property, most specific first.
    /// A node without one yields an empty list.
    pub fn compatible(&self) -> Vec<&str> {
        self.property("compatible")
            .and_then(|prop| prop.value_as_strlist().ok())
            .unwrap_or_default()
    }

    pub fn is_compatible(&self, comp: &str) -> bool {
        self.compatible().iter().any(|c| *c == comp)
    }

    /// A node is available unless its `status` says otherwise.
    pub fn is_available(&self) -> bool {
        match self.property("status").map(|prop| prop.value_as_str()) {
            None => true,
            Some(Ok(status)) => status == "okay" || status == "ok",
            Some(Err(_)) => false,
        }
    }
}

impl Default for DeviceTree {
    fn default() -> Self {
        DeviceTree::new()
    }
}

// region: construction

impl DeviceTree {
    /// A tree holding only the root node `/`.
    pub fn new() -> DeviceTree {
        DeviceTree {
            root_id: 0,
            container: vec![Node::new(0, 0, "")],
        }
    }

    /// Append a child named `full_name` (`name@unit-addr`) under `parent_id`
    /// and return its id.
    pub fn add_node(&mut self, parent_id: usize, full_name: &str) -> usize {
        let node_id = self.container.len();
        self.container.push(Node::new(node_id, parent_id, full_name));
        self.container[parent_id].children.push(node_id);
        node_id
    }

    /// Set a property, replacing a previous one with the same name.
    pub fn set_property(&mut self, node_id: usize, prop: Property) {
        let props = &mut self.container[node_id].props;
        match props.iter_mut().find(|old| old.name == prop.name) {
            Some(old) => *old = prop,
            None => props.push(prop),
        }
    }

    /// Start a child of `parent_id` with chained property setters.
    pub fn build_node(&mut self, parent_id: usize, full_name: &str) -> NodeBuilder<'_> {
        let node_id = self.add_node(parent_id, full_name);
        NodeBuilder {
            tree: self,
            node_id,
        }
    }
}

/// Chained property setter returned by [DeviceTree::build_node].
pub struct NodeBuilder<'a> {
    tree: &'a mut DeviceTree,
    node_id: usize,
}

impl NodeBuilder<'_> {
    pub fn prop(self, prop: Property) -> Self {
        self.tree.set_property(self.node_id, prop);
        self
    }
    pub fn u32(self, name: &str, value: u32) -> Self {
        self.prop(Property::from_u32(name, value))
    }
    pub fn string(self, name: &str, value: &str) -> Self {
        self.prop(Property::from_string(name, value))
    }
    pub fn compatible(self, values: &[&str]) -> Self {
        self.prop(Property::from_strlist("compatible", values))
    }
    pub fn finish(self) -> usize {
        self.node_id
    }
}

// endregion

impl DeviceTree {
    pub fn root(&self) -> &Node {
        &self.container[self.root_id]
    }
    fn is_root(&self, node: &Node) -> bool {
        self.get_parent(node).node_id == node.node_id
    }
    fn full_path(&self, node: &Node) -> String {
        if self.is_root(node) {
            String::new()
        } else {
            self.full_path(self.get_parent(node)) + "/" + node.full_name.as_ref()
        }
    }
    pub fn get_full_path(&self, node: &Node) -> Box<str> {
        if self.is_root(node) {
            return Box::from("/");
        }
        self.full_path(node).into_boxed_str()
    }
    fn get_parent(&self, node: &Node) -> &Node {
        &self.container[node.parent_id]
    }
    pub fn get_by_id(&self, node_id: usize) -> Option<&Node> {
        self.container.get(node_id)
    }
    fn get_children<'b>(&'b self, node: &Node) -> impl Iterator<Item = &'b Node> {
        node.children.iter().map(|x| &self.container[*x])
    }
    /// Children whose `status` allows them to be bound.
    pub fn available_children<'b>(&'b self, node: &Node) -> impl Iterator<Item = &'b Node> {
        self.get_children(node).filter(|child| child.is_available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tree with `/soc/pcdev@1` and a disabled `/soc/pcdev@2`; returns the
    /// ids of `soc` and both children.
    fn sample() -> (DeviceTree, [usize; 3]) {
        let mut tree = DeviceTree::new();
        let soc = tree.add_node(0, "soc");
        let a = tree
            .build_node(soc, "pcdev@1")
            .compatible(&["pcdev-Ax"])
            .u32("org,size", 512)
            .finish();
        let b = tree
            .build_node(soc, "pcdev@2")
            .compatible(&["pcdev-Bx"])
            .string("status", "disabled")
            .finish();
        (tree, [soc, a, b])
    }

    #[test]
    fn full_paths_follow_parents() {
        let (tree, [_, a, _]) = sample();
        let node = tree.get_by_id(a).unwrap();
        assert_eq!(&*node.node_name, "pcdev");
        assert_eq!(&*node.unit_addr, "1");
        assert_eq!(&*tree.get_full_path(node), "/soc/pcdev@1");
        assert_eq!(&*tree.get_full_path(tree.root()), "/");
        assert!(tree.get_by_id(42).is_none());
    }

    #[test]
    fn available_children_skip_disabled_nodes() {
        let (tree, [soc, _, b]) = sample();
        let soc = tree.get_by_id(soc).unwrap();
        let disabled = tree.get_by_id(b).unwrap();
        assert!(disabled.is_compatible("pcdev-Bx"));
        assert!(!disabled.is_available());
        let names: Vec<&str> = tree
            .available_children(soc)
            .map(|node| &*node.full_name)
            .collect();
        assert_eq!(names, ["pcdev@1"]);
    }

    #[test]
    fn set_property_replaces_existing_value() {
        let (mut tree, [_, id, _]) = sample();
        tree.set_property(id, Property::from_u32("org,size", 64));
        let node = tree.get_by_id(id).unwrap();
        assert_eq!(node.props.len(), 2);
        assert_eq!(node.require("org,size").unwrap().value_as_u32(), Ok(64));
        assert_eq!(node.require("missing"), Err(PropertyError::PropNotFound));
    }
}
