use super::{expr_hole, if_then, return_void, stmt_hole, unary, TemplateRule};
use crate::error::{Error, Result};
use crate::generator::{CopyGenerator, GeneratorLimits, ReferenceGenerator, VarGenerator};
use crate::transform::CodeTransform;
use crate::tree::{kinds, NodeClass, NodeSignature, SyntaxNode};
use std::fmt;
use std::str::FromStr;

/// Fixed rule sets grouped by defect category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateBundle {
    /// Relax, tighten, flip, or negate a condition.
    Condition,
    /// Guard a statement or condition with a null check.
    NullGuard,
    /// Add or drop a `± 1` on an expression.
    OffByOne,
    /// Return early before a statement.
    EarlyExit,
}

impl TemplateBundle {
    pub const ALL: [TemplateBundle; 4] = [
        TemplateBundle::Condition,
        TemplateBundle::NullGuard,
        TemplateBundle::OffByOne,
        TemplateBundle::EarlyExit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TemplateBundle::Condition => "condition",
            TemplateBundle::NullGuard => "null_guard",
            TemplateBundle::OffByOne => "off_by_one",
            TemplateBundle::EarlyExit => "early_exit",
        }
    }

    pub fn rules(self, limits: GeneratorLimits) -> Vec<TemplateRule> {
        match self {
            TemplateBundle::Condition => condition_rules(),
            TemplateBundle::NullGuard => null_guard_rules(limits),
            TemplateBundle::OffByOne => off_by_one_rules(),
            TemplateBundle::EarlyExit => early_exit_rules(limits),
        }
    }

    /// Built transforms tagged `<bundle>/<rule>`, with default bounds.
    pub fn transforms(self) -> Result<Vec<(String, CodeTransform)>> {
        self.transforms_with(GeneratorLimits::default())
    }

    pub fn transforms_with(self, limits: GeneratorLimits) -> Result<Vec<(String, CodeTransform)>> {
        self.rules(limits)
            .iter()
            .map(|rule| Ok((format!("{}/{}", self.name(), rule.name()), rule.build()?)))
            .collect()
    }
}

impl fmt::Display for TemplateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TemplateBundle {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        TemplateBundle::ALL
            .into_iter()
            .find(|bundle| bundle.name() == value)
            .ok_or_else(|| {
                let known: Vec<&str> = TemplateBundle::ALL.iter().map(|b| b.name()).collect();
                Error::Configuration(format!(
                    "unknown template bundle {value:?} (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

const CONDITION_SCOPES: [&str; 4] = [kinds::IF, kinds::WHILE, kinds::FOR, kinds::DO];

fn within_conditions(mut rule: TemplateRule) -> TemplateRule {
    for kind in CONDITION_SCOPES {
        rule = rule.inside(kind);
    }
    rule
}

fn operator_swap(name: &str, from: &str, to: &str) -> TemplateRule {
    TemplateRule::new(name)
        .bound(0, NodeSignature::ANY, Some(NodeClass::Expr))
        .bound(1, NodeSignature::ANY, Some(NodeClass::Expr))
        .before(vec![SyntaxNode::binary(from, expr_hole(0), expr_hole(1))])
        .after(vec![SyntaxNode::binary(to, expr_hole(0), expr_hole(1))])
}

fn condition_rules() -> Vec<TemplateRule> {
    let mut rules: Vec<TemplateRule> = [
        ("relax_lt", "<", "<="),
        ("relax_gt", ">", ">="),
        ("tighten_le", "<=", "<"),
        ("tighten_ge", ">=", ">"),
        ("flip_eq", "==", "!="),
        ("flip_ne", "!=", "=="),
        ("and_to_or", "&&", "||"),
        ("or_to_and", "||", "&&"),
    ]
    .into_iter()
    .map(|(name, from, to)| operator_swap(name, from, to))
    .collect();
    rules.push(within_conditions(
        TemplateRule::new("negate")
            .bound(0, kinds::BINARY, Some(NodeClass::Expr))
            .before(vec![expr_hole(0)])
            .after(vec![unary("!", expr_hole(0))]),
    ));
    rules.push(
        TemplateRule::new("drop_negation")
            .bound(0, NodeSignature::ANY, Some(NodeClass::Expr))
            .before(vec![unary("!", expr_hole(0))])
            .after(vec![expr_hole(0)]),
    );
    rules
}

fn any_reference(limits: GeneratorLimits) -> VarGenerator {
    VarGenerator::Reference(ReferenceGenerator {
        visibility: None,
        ty: None,
        max_elements: limits.max_elements,
    })
}

fn not_null(id: u32) -> SyntaxNode {
    SyntaxNode::binary("!=", expr_hole(id), SyntaxNode::null())
}

fn is_null(id: u32) -> SyntaxNode {
    SyntaxNode::binary("==", expr_hole(id), SyntaxNode::null())
}

fn null_guard_rules(limits: GeneratorLimits) -> Vec<TemplateRule> {
    vec![
        TemplateRule::new("guard_statement")
            .bound(0, NodeSignature::ANY, Some(NodeClass::Stmt))
            .generated(1, kinds::REF, any_reference(limits))
            .before(vec![stmt_hole(0)])
            .after(vec![if_then(not_null(1), vec![stmt_hole(0)])]),
        within_conditions(
            TemplateRule::new("guard_condition")
                .bound(0, kinds::BINARY, Some(NodeClass::Expr))
                .generated(1, kinds::REF, any_reference(limits))
                .before(vec![expr_hole(0)])
                .after(vec![SyntaxNode::binary("&&", not_null(1), expr_hole(0))]),
        ),
    ]
}

fn off_by_one_rules() -> Vec<TemplateRule> {
    let one = || SyntaxNode::literal("1");
    let adjust = |name: &str, op: &str| {
        TemplateRule::new(name)
            .bound(0, NodeSignature::ANY, Some(NodeClass::Expr))
            .before(vec![expr_hole(0)])
            .after(vec![SyntaxNode::binary(op, expr_hole(0), one())])
    };
    let undo = |name: &str, op: &str| {
        TemplateRule::new(name)
            .bound(0, NodeSignature::ANY, Some(NodeClass::Expr))
            .before(vec![SyntaxNode::binary(op, expr_hole(0), one())])
            .after(vec![expr_hole(0)])
    };
    vec![
        adjust("plus_one", "+"),
        adjust("minus_one", "-"),
        undo("drop_plus_one", "+"),
        undo("drop_minus_one", "-"),
    ]
}

fn early_exit_rules(limits: GeneratorLimits) -> Vec<TemplateRule> {
    let existing_condition = VarGenerator::Copy(CopyGenerator {
        kind: kinds::BINARY.to_string(),
        ty: None,
        max_elements: limits.max_elements,
    });
    vec![
        TemplateRule::new("return_if_null")
            .bound(0, NodeSignature::ANY, Some(NodeClass::Stmt))
            .generated(1, kinds::REF, any_reference(limits))
            .before(vec![stmt_hole(0)])
            .after(vec![if_then(is_null(1), vec![return_void()]), stmt_hole(0)]),
        TemplateRule::new("return_if_condition")
            .bound(0, NodeSignature::ANY, Some(NodeClass::Stmt))
            .generated(1, kinds::BINARY, existing_condition)
            .before(vec![stmt_hole(0)])
            .after(vec![if_then(expr_hole(1), vec![return_void()]), stmt_hole(0)]),
    ]
}
