//! Type-check oracle seam. The semantic checker lives outside this crate.
use crate::site::Site;
use crate::tree::SyntaxNode;
use std::sync::Arc;

/// Pass/fail verdict on one candidate at one site.
pub trait TypeOracle: Sync {
    fn check(&self, site: &Site, candidate: &[Arc<SyntaxNode>]) -> bool;
}

/// Oracle that passes everything; used for dry runs and the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl TypeOracle for AcceptAll {
    fn check(&self, _site: &Site, _candidate: &[Arc<SyntaxNode>]) -> bool {
        true
    }
}

impl<F> TypeOracle for F
where
    F: Fn(&Site, &[Arc<SyntaxNode>]) -> bool + Sync,
{
    fn check(&self, site: &Site, candidate: &[Arc<SyntaxNode>]) -> bool {
        self(site, candidate)
    }
}
