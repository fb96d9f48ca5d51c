use std::collections::{HashMap, VecDeque};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

use super::nodes::{Link, Node, NodeId};

/// Structural problems in a job graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node {0} is defined twice")]
    DuplicateNode(NodeId),

    #[error("node {node} references missing node {target}")]
    DanglingReference { node: NodeId, target: NodeId },

    #[error("node graph contains a cycle through {}", join_ids(.0))]
    Cycle(Vec<NodeId>),
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", ")
}

/// A computation graph submitted to the server as one job.
///
/// Nodes keep insertion order, which is also the order they serialize in.
/// The graph is only handed out by the builders after [`validate`](Self::validate)
/// has passed, and submission borrows it immutably.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDescriptor {
    nodes: Vec<(NodeId, Node)>,
}

impl JobDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<NodeId>, node: Node) -> Result<(), GraphError> {
        let id = id.into();
        if self.contains(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.nodes.push((id, node));
        Ok(())
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|(k, _)| k == id).map(|(_, n)| n)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|(k, _)| k == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter().map(|(k, n)| (k, n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Smallest numeric id greater than every numeric id in the graph.
    pub fn next_id(&self) -> NodeId {
        let max = self
            .nodes
            .iter()
            .filter_map(|(k, _)| k.as_str().parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        NodeId::new((max + 1).to_string())
    }

    /// Checks referential closure and acyclicity.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (id, node) in &self.nodes {
            for link in node.links() {
                if !self.contains(&link.node) {
                    return Err(GraphError::DanglingReference {
                        node: id.clone(),
                        target: link.node.clone(),
                    });
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Node ids ordered so that every node comes after the nodes it references.
    ///
    /// Kahn's algorithm; ties keep insertion order.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut indegree: HashMap<&NodeId, usize> =
            self.nodes.iter().map(|(k, _)| (k, 0)).collect();
        let mut consumers: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();

        for (id, node) in &self.nodes {
            for link in node.links() {
                if let Some(d) = indegree.get_mut(id) {
                    *d += 1;
                }
                consumers.entry(&link.node).or_default().push(id);
            }
        }

        let mut ready: VecDeque<&NodeId> = self
            .nodes
            .iter()
            .map(|(k, _)| k)
            .filter(|k| indegree[k] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            order.push(id.clone());
            for consumer in consumers.get(id).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(consumer) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(*consumer);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck = self
                .nodes
                .iter()
                .map(|(k, _)| k)
                .filter(|k| indegree[k] > 0)
                .cloned()
                .collect();
            return Err(GraphError::Cycle(stuck));
        }
        Ok(order)
    }

    /// Inserts an adapter node and re-points consumers at it.
    ///
    /// Each `(base, adapter_output)` pair redirects every input equal to
    /// `base` to output `adapter_output` of the new node. The adapter's own
    /// inputs still point at the base outputs, and nodes holding none of the
    /// rewired references are left untouched. Returns the ids of rewritten
    /// nodes in graph order. On error the graph is unchanged.
    pub fn splice_adapter(
        &mut self,
        adapter_id: impl Into<NodeId>,
        adapter: Node,
        rewires: &[(Link, u32)],
    ) -> Result<Vec<NodeId>, GraphError> {
        let adapter_id = adapter_id.into();
        if self.contains(&adapter_id) {
            return Err(GraphError::DuplicateNode(adapter_id));
        }
        for link in adapter.links() {
            if !self.contains(&link.node) {
                return Err(GraphError::DanglingReference {
                    node: adapter_id.clone(),
                    target: link.node.clone(),
                });
            }
        }

        let mut spliced = self.clone();
        let mut rewritten = Vec::new();
        for (id, node) in &mut spliced.nodes {
            let mut touched = false;
            for link in node.links_mut() {
                if let Some((_, output)) = rewires.iter().find(|(base, _)| base == link) {
                    *link = Link::new(adapter_id.clone(), *output);
                    touched = true;
                }
            }
            if touched {
                rewritten.push(id.clone());
            }
        }

        spliced.nodes.push((adapter_id, adapter));
        spliced.validate()?;
        *self = spliced;
        Ok(rewritten)
    }
}

impl Serialize for JobDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.nodes.len()))?;
        for (id, node) in &self.nodes {
            map.serialize_entry(id, node)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::nodes::{
        CheckpointLoader, ClipTextEncode, LoraLoader, SaveImage, VaeDecode,
    };

    fn loader() -> Node {
        Node::CheckpointLoader(CheckpointLoader {
            ckpt_name: "base.safetensors".into(),
        })
    }

    fn encode(clip: Link) -> Node {
        Node::ClipTextEncode(ClipTextEncode {
            text: "prompt".into(),
            clip,
        })
    }

    fn decode(samples: Link, vae: Link) -> Node {
        Node::VaeDecode(VaeDecode { samples, vae })
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut g = JobDescriptor::new();
        g.insert("1", loader()).unwrap();
        assert_eq!(
            g.insert("1", loader()),
            Err(GraphError::DuplicateNode("1".into()))
        );
    }

    #[test]
    fn dangling_reference_fails_validation() {
        let mut g = JobDescriptor::new();
        g.insert("1", loader()).unwrap();
        g.insert("2", encode(Link::new("7", 1))).unwrap();
        assert_eq!(
            g.validate(),
            Err(GraphError::DanglingReference {
                node: "2".into(),
                target: "7".into()
            })
        );
    }

    #[test]
    fn cycle_fails_validation() {
        let mut g = JobDescriptor::new();
        g.insert("1", decode(Link::new("2", 0), Link::new("2", 0)))
            .unwrap();
        g.insert("2", decode(Link::new("1", 0), Link::new("1", 0)))
            .unwrap();
        let err = g.validate().unwrap_err();
        assert!(matches!(err, GraphError::Cycle(ref ids) if ids.len() == 2));
        assert!(err.to_string().contains("1, 2"));
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let mut g = JobDescriptor::new();
        g.insert(
            "3",
            Node::SaveImage(SaveImage {
                filename_prefix: "out".into(),
                images: Link::new("2", 0),
            }),
        )
        .unwrap();
        g.insert("2", encode(Link::new("1", 1))).unwrap();
        g.insert("1", loader()).unwrap();
        let order = g.topological_order().unwrap();
        assert_eq!(
            order,
            vec![NodeId::from("1"), NodeId::from("2"), NodeId::from("3")]
        );
    }

    #[test]
    fn serializes_in_insertion_order() {
        let mut g = JobDescriptor::new();
        g.insert("10", loader()).unwrap();
        g.insert("2", encode(Link::new("10", 1))).unwrap();
        let json = serde_json::to_string(&g).unwrap();
        assert!(json.find(r#""10""#).unwrap() < json.find(r#""2""#).unwrap());
    }

    #[test]
    fn next_id_follows_largest_numeric_id() {
        let mut g = JobDescriptor::new();
        assert_eq!(g.next_id(), NodeId::from("1"));
        g.insert("9", loader()).unwrap();
        g.insert("10", encode(Link::new("9", 1))).unwrap();
        assert_eq!(g.next_id(), NodeId::from("11"));
    }

    #[test]
    fn splice_rewrites_only_consumers_of_rewired_outputs() {
        let mut g = JobDescriptor::new();
        g.insert("1", loader()).unwrap();
        g.insert("2", encode(Link::new("1", 1))).unwrap();
        g.insert("3", decode(Link::new("2", 0), Link::new("1", 2)))
            .unwrap();
        let untouched_before = g.get(&"3".into()).cloned();

        let adapter = Node::LoraLoader(LoraLoader {
            lora_name: "style.safetensors".into(),
            strength_model: 1.0,
            strength_clip: 1.0,
            model: Link::new("1", 0),
            clip: Link::new("1", 1),
        });
        let rewritten = g
            .splice_adapter(
                "4",
                adapter,
                &[(Link::new("1", 0), 0), (Link::new("1", 1), 1)],
            )
            .unwrap();

        assert_eq!(rewritten, vec![NodeId::from("2")]);
        assert_eq!(g.get(&"2".into()).unwrap().links(), vec![&Link::new("4", 1)]);
        // The decoder only used the VAE output, which was not rewired.
        assert_eq!(g.get(&"3".into()).cloned(), untouched_before);
        // The adapter itself still reads from the base loader.
        assert_eq!(
            g.get(&"4".into()).unwrap().links(),
            vec![&Link::new("1", 0), &Link::new("1", 1)]
        );
        assert!(g.validate().is_ok());
    }

    #[test]
    fn splice_with_dangling_adapter_input_fails() {
        let mut g = JobDescriptor::new();
        g.insert("1", loader()).unwrap();
        let adapter = Node::LoraLoader(LoraLoader {
            lora_name: "x".into(),
            strength_model: 1.0,
            strength_clip: 1.0,
            model: Link::new("5", 0),
            clip: Link::new("1", 1),
        });
        let err = g.splice_adapter("2", adapter, &[]).unwrap_err();
        assert!(matches!(err, GraphError::DanglingReference { .. }));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn splice_that_creates_a_cycle_leaves_graph_unchanged() {
        let mut g = JobDescriptor::new();
        g.insert("1", loader()).unwrap();
        g.insert("2", encode(Link::new("1", 1))).unwrap();
        let before = g.clone();

        // Reads the encoder while the encoder is re-pointed at the adapter.
        let adapter = Node::LoraLoader(LoraLoader {
            lora_name: "x".into(),
            strength_model: 1.0,
            strength_clip: 1.0,
            model: Link::new("2", 0),
            clip: Link::new("1", 1),
        });
        let err = g
            .splice_adapter("3", adapter, &[(Link::new("1", 1), 1)])
            .unwrap_err();

        assert!(matches!(err, GraphError::Cycle(_)));
        assert_eq!(g, before);
        assert_eq!(g.get(&"2".into()).unwrap().links(), vec![&Link::new("1", 1)]);
    }
}
