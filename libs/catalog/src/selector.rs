//! Tag-based instance selection and mutation.

use tracing::info;

use crate::error::CatalogError;
use crate::instance::ServiceInstance;
use crate::registry::ServiceRegistry;
use crate::tag::Tag;

/// Return the first instance (in registry iteration order) carrying the tag.
pub fn search_with_tag<'a>(
    instances: &'a [ServiceInstance],
    tag: &Tag,
) -> Result<&'a ServiceInstance, CatalogError> {
    instances
        .iter()
        .find(|i| i.has_tag(tag))
        .ok_or_else(|| CatalogError::NotFound(format!("no instance with tag {tag}")))
}

/// Return the first instance (in registry iteration order) lacking the tag.
pub fn search_without_tag<'a>(
    instances: &'a [ServiceInstance],
    tag: &Tag,
) -> Result<&'a ServiceInstance, CatalogError> {
    instances
        .iter()
        .find(|i| !i.has_tag(tag))
        .ok_or_else(|| CatalogError::NotFound(format!("no instance without tag {tag}")))
}

/// Add a tag to an instance and re-register the full service definition.
///
/// Idempotent: a no-op if the tag is already present. The write is a full
/// overwrite of the record, not a patch; a concurrent writer mutating the
/// same instance can lose this addition (last-writer-wins).
pub async fn add_tag(
    registry: &dyn ServiceRegistry,
    instance: &mut ServiceInstance,
    tag: &Tag,
) -> Result<(), CatalogError> {
    if instance.has_tag(tag) {
        return Ok(());
    }

    info!(
        service = %instance.service_name,
        node = %instance.node,
        tag = %tag,
        "Adding tag (full-record overwrite)"
    );
    instance.tags.push(tag.encoded());
    registry.register(instance).await
}

/// Remove a tag from an instance and re-register the full service definition.
///
/// Idempotent: a no-op if the tag is absent.
pub async fn delete_tag(
    registry: &dyn ServiceRegistry,
    instance: &mut ServiceInstance,
    tag: &Tag,
) -> Result<(), CatalogError> {
    if !instance.has_tag(tag) {
        return Ok(());
    }

    info!(
        service = %instance.service_name,
        node = %instance.node,
        tag = %tag,
        "Deleting tag (full-record overwrite)"
    );
    let encoded = tag.encoded();
    instance.tags.retain(|t| t != &encoded);
    registry.register(instance).await
}
