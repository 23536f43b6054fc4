//! The protocol authority record.

use super::read_record;
use crate::cache::{CacheType, FetchContext};
use async_trait::async_trait;
use dove_core::{Authority, CacheId, DoveResult, Principal};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorityView {
    /// `None` until the authority account has been created.
    pub authority: Option<Authority>,
}

impl AuthorityView {
    pub fn is_authority(&self, principal: Option<Principal>) -> bool {
        match (self.authority, principal) {
            (Some(authority), Some(principal)) => authority.key == principal.key(),
            _ => false,
        }
    }
}

pub struct AuthorityCache;

#[async_trait]
impl CacheType for AuthorityCache {
    type Value = AuthorityView;
    const ID: CacheId = CacheId::new("authority-cache");

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<AuthorityView> {
        let key = Authority::derive_key(&ctx.program_id());
        Ok(AuthorityView {
            authority: read_record::<Authority>(ctx, &key).await?,
        })
    }

    fn mock(&self, _ctx: &FetchContext) -> AuthorityView {
        AuthorityView { authority: None }
    }
}
