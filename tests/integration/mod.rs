// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod dead_domain_test;
pub mod domain_cache_test;
pub mod fetch_mode_test;
pub mod helpers;
pub mod resume_test;
pub mod scenario_test;
