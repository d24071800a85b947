//! Reading annotation scopes off Kubernetes objects.

use kube::{Resource, ResourceExt};
use lbconf_api::Status;

use crate::{AnnotationSource, AnnotationValue, Key};

/// The prefix every annotation on a Kubernetes object must carry.
pub const ANNOTATION_PREFIX: &str = "ingress.lbconf.io/";

impl AnnotationSource {
    /// Read an annotation scope from a Kubernetes object's metadata.
    ///
    /// Only annotations under [ANNOTATION_PREFIX] that name a recognized
    /// [Key] are kept. Every value gets the same `status`. Diffing against the
    /// previous cycle is up to the caller.
    pub fn from_resource<K: Resource>(obj: &K, status: Status) -> Self {
        obj.annotations()
            .iter()
            .filter_map(|(name, value)| {
                let key: Key = name.strip_prefix(ANNOTATION_PREFIX)?.parse().ok()?;
                Some((key.as_str(), AnnotationValue::new(value.clone(), status)))
            })
            .collect()
    }
}
