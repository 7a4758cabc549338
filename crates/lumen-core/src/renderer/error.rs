// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::renderer::api::{TextureFormat, TextureId};
use std::fmt;

/// An error related to the creation or use of a GPU resource (buffers, textures,
/// render targets).
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// A generic resource could not be found.
    NotFound,
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// A texture format name could not be parsed.
    UnknownFormat(String),
    /// The device cannot create textures of this format with the requested usage.
    UnsupportedFormat(TextureFormat),
    /// More color attachments were requested than the device supports.
    AttachmentLimitExceeded {
        /// The number of color attachments requested.
        requested: usize,
        /// The device limit.
        max: usize,
    },
    /// The device rejected a set of render targets.
    InvalidRenderTargets(String),
    /// A copy referenced a texture the device does not know.
    InvalidCopyDestination(TextureId),
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::UnknownFormat(name) => {
                write!(f, "Unknown texture format '{name}'")
            }
            ResourceError::UnsupportedFormat(format) => {
                write!(f, "Texture format {format:?} is not supported by the device")
            }
            ResourceError::AttachmentLimitExceeded { requested, max } => write!(
                f,
                "Requested {requested} color attachments but the device supports only {max}"
            ),
            ResourceError::InvalidRenderTargets(msg) => {
                write!(f, "Render target validation failed: {msg}")
            }
            ResourceError::InvalidCopyDestination(id) => {
                write!(f, "Invalid copy destination texture {id:?}")
            }
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// A high-level error that can occur within a render manager or graphics device.
#[derive(Debug)]
pub enum RenderError {
    /// An operation was attempted before the rendering system was initialized.
    NotInitialized,
    /// A failure occurred during the initialization of a rendering component.
    InitializationFailed(String),
    /// A critical rendering operation failed and the frame was aborted.
    RenderingFailed(String),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NotInitialized => {
                write!(f, "The rendering system is not initialized.")
            }
            RenderError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize rendering component: {msg}")
            }
            RenderError::RenderingFailed(msg) => {
                write!(f, "A critical rendering operation failed: {msg}")
            }
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}
