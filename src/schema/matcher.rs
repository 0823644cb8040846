//! Skeleton matching against concrete fragments.
//!
//! Collection slots absorb a run of siblings, so sequence matching
//! backtracks over the run length (shortest first).
use super::{Bindings, Pattern, SlotId, SlotInfo};
use crate::tree::SyntaxNode;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bind `patterns` against `nodes`, or `None` when the skeleton does not fit.
pub fn match_fragment(
    patterns: &[Pattern],
    nodes: &[Arc<SyntaxNode>],
    slots: &BTreeMap<SlotId, SlotInfo>,
) -> Option<Bindings> {
    match_fragment_with(patterns, nodes, slots, Bindings::new())
}

/// Like [`match_fragment`], starting from existing bindings. A slot that is
/// already bound must match its bound value exactly.
pub fn match_fragment_with(
    patterns: &[Pattern],
    nodes: &[Arc<SyntaxNode>],
    slots: &BTreeMap<SlotId, SlotInfo>,
    initial: Bindings,
) -> Option<Bindings> {
    let mut bindings = initial;
    if match_seq(patterns, nodes, slots, &mut bindings) {
        Some(bindings)
    } else {
        None
    }
}

fn match_seq(
    patterns: &[Pattern],
    nodes: &[Arc<SyntaxNode>],
    slots: &BTreeMap<SlotId, SlotInfo>,
    bindings: &mut Bindings,
) -> bool {
    let Some((first, rest)) = patterns.split_first() else {
        return nodes.is_empty();
    };
    match first {
        Pattern::Slot { id } => {
            let Some(info) = slots.get(id) else {
                return false;
            };
            if info.signature.is_collection {
                let max_run = nodes.iter().take_while(|node| info.accepts(node)).count();
                for len in 0..=max_run {
                    let snapshot = bindings.clone();
                    if bind(*id, &nodes[..len], bindings)
                        && match_seq(rest, &nodes[len..], slots, bindings)
                    {
                        return true;
                    }
                    *bindings = snapshot;
                }
                false
            } else {
                let Some((node, remaining)) = nodes.split_first() else {
                    return false;
                };
                info.accepts(node)
                    && bind(*id, std::slice::from_ref(node), bindings)
                    && match_seq(rest, remaining, slots, bindings)
            }
        }
        Pattern::Node {
            kind,
            class,
            token,
            ty,
            children,
        } => {
            let Some((node, remaining)) = nodes.split_first() else {
                return false;
            };
            if node.kind != *kind || node.class != *class || node.token != *token || node.ty != *ty
            {
                return false;
            }
            let snapshot = bindings.clone();
            if match_seq(children, &node.children, slots, bindings)
                && match_seq(rest, remaining, slots, bindings)
            {
                return true;
            }
            *bindings = snapshot;
            false
        }
    }
}

fn bind(id: SlotId, value: &[Arc<SyntaxNode>], bindings: &mut Bindings) -> bool {
    match bindings.get(&id) {
        Some(existing) => existing.as_slice() == value,
        None => {
            bindings.insert(id, value.to_vec());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeClass, NodeSignature, Token};

    fn slot_info(kind: &str, collection: bool) -> SlotInfo {
        SlotInfo {
            signature: NodeSignature {
                kind: kind.to_string(),
                is_collection: collection,
            },
            class: None,
            inferable: true,
        }
    }

    fn block(children: Vec<Pattern>) -> Pattern {
        Pattern::Node {
            kind: "block".to_string(),
            class: NodeClass::Stmt,
            token: None,
            ty: None,
            children,
        }
    }

    fn stmt(name: &str) -> Arc<SyntaxNode> {
        Arc::new(SyntaxNode::stmt(
            "expr_stmt",
            vec![SyntaxNode::reference(name)],
        ))
    }

    #[test]
    fn collection_slot_absorbs_middle_run() {
        let mut slots = BTreeMap::new();
        slots.insert(0, slot_info("*", true));
        let last = Pattern::fixed(&stmt("done"));
        let patterns = vec![block(vec![Pattern::Slot { id: 0 }, last])];
        let target = Arc::new(
            SyntaxNode::new("block", NodeClass::Stmt)
                .with_children(vec![stmt("a"), stmt("b"), stmt("done")]),
        );
        let bindings = match_fragment(&patterns, &[target], &slots).expect("match");
        assert_eq!(bindings[&0], vec![stmt("a"), stmt("b")]);
    }

    #[test]
    fn repeated_slot_requires_equal_values() {
        let mut slots = BTreeMap::new();
        slots.insert(0, slot_info("ref", false));
        let pattern = Pattern::Node {
            kind: "binop".to_string(),
            class: NodeClass::Expr,
            token: Some(Token::Operator("-".to_string())),
            ty: None,
            children: vec![Pattern::Slot { id: 0 }, Pattern::Slot { id: 0 }],
        };
        let same = SyntaxNode::binary("-", SyntaxNode::reference("x"), SyntaxNode::reference("x"));
        let different =
            SyntaxNode::binary("-", SyntaxNode::reference("x"), SyntaxNode::reference("y"));
        assert!(match_fragment(&[pattern.clone()], &[Arc::new(same)], &slots).is_some());
        assert!(match_fragment(&[pattern], &[Arc::new(different)], &slots).is_none());
    }

    #[test]
    fn slot_signature_filters_kind() {
        let mut slots = BTreeMap::new();
        slots.insert(0, slot_info("ref", false));
        let patterns = vec![Pattern::Slot { id: 0 }];
        assert!(match_fragment(&patterns, &[Arc::new(SyntaxNode::literal("1"))], &slots).is_none());
        assert!(
            match_fragment(&patterns, &[Arc::new(SyntaxNode::reference("x"))], &slots).is_some()
        );
    }
}
