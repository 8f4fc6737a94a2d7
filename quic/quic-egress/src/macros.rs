// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Returns early unless the condition holds.
///
/// The second form returns the given value instead of `()`.
macro_rules! ensure {
    ($cond:expr) => {
        ensure!($cond, ());
    };
    ($cond:expr, $otherwise:expr) => {
        if !($cond) {
            return $otherwise;
        }
    };
}
