// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Attribute and field names shared by metrics and log events.

pub(crate) const CACHE_OPERATION: &str = "cache.operation";
pub(crate) const CACHE_OUTCOME: &str = "cache.outcome";
pub(crate) const CACHE_BACKEND: &str = "cache.backend";
pub(crate) const CACHE_TRANSITION_MANUAL: &str = "cache.transition.manual";
