//! Scoped discovery below a controller's node.

use crate::error::Result;

use super::{ModifierId, NodeId, Scene};

/// What one walk below a controller root found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Traversal {
    /// Nodes whose geometry belongs to the controller, in depth-first
    /// pre-order. The root itself is never included.
    pub nodes: Vec<NodeId>,
    /// Ignore markers encountered; nothing below them was visited.
    pub ignored: Vec<NodeId>,
    /// Modifiers the controller drives.
    pub modifiers: Vec<ModifierId>,
}

/// Walks the descendants of `root`.
///
/// For every child:
/// * its modifiers are collected, whatever else is on the node;
/// * a nested controller ends the walk down that branch (its subtree,
///   including modifiers below it, belongs to the nested controller);
/// * an ignore marker is recorded and ends the walk down that branch;
/// * otherwise the node is gathered and its children are visited.
///
/// # Errors
///
/// Returns an error if `root` is not in the scene.
pub fn collect(scene: &Scene, root: NodeId) -> Result<Traversal> {
    let mut traversal = Traversal::default();
    visit_children(scene, root, &mut traversal)?;
    Ok(traversal)
}

fn visit_children(scene: &Scene, parent: NodeId, out: &mut Traversal) -> Result<()> {
    for &child in scene.children(parent)? {
        let data = scene.node(child)?;
        out.modifiers.extend_from_slice(&data.modifiers);

        if data.controller.is_some() {
            continue;
        }
        if data.ignore {
            out.ignored.push(child);
            continue;
        }

        out.nodes.push(child);
        visit_children(scene, child, out)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::modifier::ModifierKind;
    use crate::settings::SliceConfig;

    #[test]
    fn walk_is_depth_first_and_skips_root() {
        let mut scene = Scene::new();
        let root = scene.add_root("root");
        let a = scene.add_child(root, "a").unwrap();
        let a1 = scene.add_child(a, "a1").unwrap();
        let b = scene.add_child(root, "b").unwrap();

        let walk = collect(&scene, root).unwrap();
        assert_eq!(walk.nodes, vec![a, a1, b]);
        assert!(walk.ignored.is_empty());
    }

    #[test]
    fn ignore_marker_hides_its_whole_subtree() {
        let mut scene = Scene::new();
        let root = scene.add_root("root");
        let ignored = scene.add_child(root, "ignored").unwrap();
        let below = scene.add_child(ignored, "below").unwrap();
        let deep = scene.add_child(below, "deep").unwrap();
        scene.node_mut(ignored).unwrap().ignore = true;

        let on_marker = scene.add_modifier(ignored, ModifierKind::scale()).unwrap();
        let beneath = scene.add_modifier(deep, ModifierKind::scale()).unwrap();

        let walk = collect(&scene, root).unwrap();
        assert!(walk.nodes.is_empty());
        assert_eq!(walk.ignored, vec![ignored]);
        assert_eq!(walk.modifiers, vec![on_marker]);
        assert!(!walk.modifiers.contains(&beneath));
    }

    #[test]
    fn nested_controller_keeps_its_subtree_but_not_its_own_modifiers() {
        let mut scene = Scene::new();
        let root = scene.add_root("root");
        let nested = scene.add_child(root, "nested").unwrap();
        let nested_child = scene.add_child(nested, "nested child").unwrap();
        scene.attach_controller(nested, SliceConfig::default()).unwrap();

        let on_nested = scene.add_modifier(nested, ModifierKind::controller()).unwrap();
        let under_nested = scene
            .add_modifier(nested_child, ModifierKind::scale())
            .unwrap();

        let outer = collect(&scene, root).unwrap();
        assert!(outer.nodes.is_empty());
        assert_eq!(outer.modifiers, vec![on_nested]);

        let inner = collect(&scene, nested).unwrap();
        assert_eq!(inner.nodes, vec![nested_child]);
        assert_eq!(inner.modifiers, vec![under_nested]);
    }
}
