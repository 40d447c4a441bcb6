// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use opentelemetry::InstrumentationScope;
use opentelemetry::metrics::{Counter, Meter, MeterProvider};

const METER_NAME: &str = "lifeboat";
const VERSION: &str = "v0.1.0";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";
const OPERATION_COUNT_NAME: &str = "lifeboat.operation.count";
const TRANSITION_COUNT_NAME: &str = "lifeboat.backend.transition.count";

pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(
        InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

pub(crate) fn create_operation_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter(OPERATION_COUNT_NAME)
        .with_description("Cache operations by serving backend and outcome")
        .with_unit("{operation}")
        .build()
}

pub(crate) fn create_transition_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter(TRANSITION_COUNT_NAME)
        .with_description("Switches of the active cache backend")
        .with_unit("{transition}")
        .build()
}
