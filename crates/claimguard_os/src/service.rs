#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use claimguard_engines::flag_authority::{
    CapabilityOracle, ClaimAclPolicy, FlagAuthorityConfig, FlagAuthorityRuntime,
};
use claimguard_engines::flag_resolver::{FlagResolverConfig, FlagResolverRuntime};
use claimguard_kernel_contracts::claim::{ClaimType, WorldId};
use claimguard_kernel_contracts::context::{Context, ContextSet};
use claimguard_kernel_contracts::flag::{FlagCatalog, FlagKey};
use claimguard_kernel_contracts::Tristate;
use claimguard_storage::repo::{ClaimTreeRepo, FlagPermissionRepo};
use claimguard_storage::{ClaimRegistry, FlagStores, PermissionStoreKind};
use tracing::{debug, info};

use crate::collaborators::{ClaimPersistence, NoopPersistence, OwnerDirectory, TrustListAcl};
use crate::config::ClaimGuardConfig;
use crate::error::ClaimFlagError;

/// Host-provided services the engine calls out to.
pub struct ClaimGuardCollaborators {
    pub capabilities: Arc<dyn CapabilityOracle>,
    pub acl: Arc<dyn ClaimAclPolicy>,
    pub owners: Arc<dyn OwnerDirectory>,
    pub persistence: Arc<dyn ClaimPersistence>,
}

impl ClaimGuardCollaborators {
    /// Trust-list ACL over `capabilities`, no persistence.
    pub fn with_defaults(
        capabilities: Arc<dyn CapabilityOracle>,
        owners: Arc<dyn OwnerDirectory>,
    ) -> Self {
        Self {
            acl: Arc::new(TrustListAcl::new(Arc::clone(&capabilities))),
            capabilities,
            owners,
            persistence: Arc::new(NoopPersistence),
        }
    }
}

/// Process-wide owner of the flag stores and claim trees. Built once with
/// [`ClaimGuardService::start`]; safe to share across request handlers.
pub struct ClaimGuardService {
    pub(crate) config: ClaimGuardConfig,
    pub(crate) catalog: FlagCatalog,
    pub(crate) stores: FlagStores,
    pub(crate) claims: ClaimRegistry,
    pub(crate) source_contexts: RwLock<BTreeMap<String, Context>>,
    pub(crate) resolver: FlagResolverRuntime,
    pub(crate) authority: FlagAuthorityRuntime,
    pub(crate) collaborators: ClaimGuardCollaborators,
}

impl ClaimGuardService {
    pub fn start(
        config: ClaimGuardConfig,
        collaborators: ClaimGuardCollaborators,
    ) -> Result<Self, ClaimFlagError> {
        config.validate()?;
        let catalog = config.flag_catalog()?;
        let worlds = config.world_ids()?;
        let service = Self {
            config,
            catalog,
            stores: FlagStores::new_in_memory(),
            claims: ClaimRegistry::new(),
            source_contexts: RwLock::new(BTreeMap::new()),
            resolver: FlagResolverRuntime::new(FlagResolverConfig::mvp_v1()),
            authority: FlagAuthorityRuntime::new(FlagAuthorityConfig::mvp_v1()),
            collaborators,
        };
        for world_id in &worlds {
            service.register_world(world_id)?;
        }
        info!(
            worlds = worlds.len(),
            flags = service.catalog.len(),
            "claim guard started"
        );
        Ok(service)
    }

    /// Flushes persistence and drops session-only defaults. Claims and
    /// persistent flags stay readable.
    pub fn shutdown(&self) {
        self.collaborators.persistence.flush();
        self.stores.transient().clear();
        info!("claim guard shut down");
    }

    pub fn config(&self) -> &ClaimGuardConfig {
        &self.config
    }

    pub fn catalog(&self) -> &FlagCatalog {
        &self.catalog
    }

    pub fn stores(&self) -> &FlagStores {
        &self.stores
    }

    /// Creates the world's claim tree on first use and seeds the transient
    /// DEFAULT layer from config. Re-registering re-seeds.
    pub fn register_world(&self, world_id: &WorldId) -> Result<(), ClaimFlagError> {
        self.claims.register_world_row(world_id);
        let mut seeded = 0usize;
        for claim_type in [ClaimType::Wilderness, ClaimType::Admin, ClaimType::Basic] {
            let contexts = ContextSet::empty()
                .with(Context::claim_default(claim_type))
                .with(Context::world(world_id));
            for (flag, value) in self.config.default_flags.for_claim_type(claim_type) {
                let key = FlagKey::compose(flag, None)?;
                self.stores.set_scope_value(
                    PermissionStoreKind::Transient,
                    &contexts,
                    key.as_str(),
                    Tristate::from_bool(*value),
                )?;
                seeded += 1;
            }
        }
        debug!(world = %world_id, seeded, "world registered");
        Ok(())
    }

    /// Makes `name` usable as a source context. Names are case-insensitive.
    pub fn register_source_context(&self, name: &str) -> Result<Context, ClaimFlagError> {
        let context = Context::source(name)?;
        self.source_contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context.value().to_string(), context.clone());
        debug!(source = %context, "source context registered");
        Ok(context)
    }

    pub fn source_context(&self, name: &str) -> Option<Context> {
        self.source_contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
    }

    pub(crate) fn registered_source_contexts(&self) -> Vec<Context> {
        self.source_contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
