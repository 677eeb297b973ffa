//! Cache key addressing one logical credential.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, ServiceId},
};

/// Identifies which logical credential a cached [`Jwt`](crate::auth::Jwt) belongs to.
///
/// Equality covers both the scope set (order-insensitive) and the service id. The key with no
/// scopes and no service id is the default, unscoped credential.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Scopes the credential is requested for.
	#[serde(default)]
	pub scopes: ScopeSet,
	/// Downstream service the credential is requested for.
	#[serde(default)]
	pub service_id: Option<ServiceId>,
}
impl CacheKey {
	/// Builds a key carrying both scopes and a service id.
	pub fn new(scopes: ScopeSet, service_id: Option<ServiceId>) -> Self {
		Self { scopes, service_id }
	}

	/// Builds a scope-only key.
	pub fn for_scopes(scopes: ScopeSet) -> Self {
		Self { scopes, service_id: None }
	}

	/// Builds a service-only key.
	pub fn for_service(service_id: ServiceId) -> Self {
		Self { scopes: ScopeSet::default(), service_id: Some(service_id) }
	}

	/// Resolves the key for a caller that may supply scopes, a service id, or neither.
	///
	/// Scopes take precedence over the service id when both are present; with neither the default
	/// key is returned.
	pub fn from_parts(scopes: Option<ScopeSet>, service_id: Option<ServiceId>) -> Self {
		match (scopes, service_id) {
			(Some(scopes), _) => Self::for_scopes(scopes),
			(None, Some(service_id)) => Self::for_service(service_id),
			(None, None) => Self::default(),
		}
	}

	/// Returns true for the default, unscoped credential.
	pub fn is_default(&self) -> bool {
		self.scopes.is_empty() && self.service_id.is_none()
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match (&self.service_id, self.scopes.is_empty()) {
			(None, true) => f.write_str("<default>"),
			(None, false) => write!(f, "scopes[{}]", self.scopes),
			(Some(service), true) => write!(f, "service[{service}]"),
			(Some(service), false) => write!(f, "service[{service}] scopes[{}]", self.scopes),
		}
	}
}
