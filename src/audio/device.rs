//! Output device enumeration and cable lookup

use super::{AudioBackend, OutputEndpoint, StreamError};

/// Enumerates output endpoints through the shared backend
pub struct DeviceRegistry<B> {
    backend: B,
}

impl<B: AudioBackend> DeviceRegistry<B> {
    /// Create a registry over `backend`
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Query the host for its output endpoints
    ///
    /// # Errors
    ///
    /// Returns error if the host cannot enumerate devices
    pub fn enumerate_outputs(&self) -> Result<Vec<OutputEndpoint>, StreamError> {
        let endpoints = self.backend.output_endpoints()?;
        tracing::debug!(count = endpoints.len(), "enumerated output devices");
        Ok(endpoints)
    }

    /// The default speaker endpoint, if the host has one
    #[must_use]
    pub fn default_output(&self) -> Option<OutputEndpoint> {
        self.backend.default_output()
    }

    /// Enumerate and search for `fragment` without caching
    ///
    /// # Errors
    ///
    /// Returns error if enumeration fails
    pub fn find(&self, fragment: &str) -> Result<Option<OutputEndpoint>, StreamError> {
        let endpoints = self.enumerate_outputs()?;
        Ok(find_by_name_fragment(fragment, &endpoints).cloned())
    }
}

/// Find the first output-capable endpoint whose name contains `fragment`
///
/// Matching is case-insensitive. Endpoints without output channels are
/// skipped and an empty fragment matches nothing.
#[must_use]
pub fn find_by_name_fragment<'a>(
    fragment: &str,
    endpoints: &'a [OutputEndpoint],
) -> Option<&'a OutputEndpoint> {
    let needle = fragment.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    endpoints
        .iter()
        .filter(|e| e.output_channels > 0)
        .find(|e| e.name.to_lowercase().contains(&needle))
}

/// Memoized result of the cable device search
///
/// The search runs once; later calls return the cached outcome even if
/// devices have since appeared or disappeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResolvedCable {
    /// Not searched yet
    #[default]
    Unresolved,
    /// Found during the search
    Present(OutputEndpoint),
    /// Searched and not found (or enumeration failed)
    Absent,
}

impl ResolvedCable {
    /// Return the cable endpoint, searching on first use only
    pub fn resolve<B: AudioBackend>(
        &mut self,
        registry: &DeviceRegistry<B>,
        fragment: &str,
    ) -> Option<&OutputEndpoint> {
        if matches!(self, Self::Unresolved) {
            *self = match registry.find(fragment) {
                Ok(Some(endpoint)) => {
                    tracing::info!(
                        device = %endpoint.name,
                        index = endpoint.index,
                        "cable output device found"
                    );
                    Self::Present(endpoint)
                }
                Ok(None) => {
                    tracing::warn!(
                        fragment,
                        "cable output device not found, playing to speaker only"
                    );
                    Self::Absent
                }
                Err(e) => {
                    tracing::warn!(
                        fragment,
                        error = %e,
                        "output device enumeration failed, playing to speaker only"
                    );
                    Self::Absent
                }
            };
        }

        self.endpoint()
    }

    /// Cached endpoint, without searching
    #[must_use]
    pub const fn endpoint(&self) -> Option<&OutputEndpoint> {
        match self {
            Self::Present(endpoint) => Some(endpoint),
            Self::Unresolved | Self::Absent => None,
        }
    }

    /// Whether the search has already run
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}
