// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Host Abstraction Layer
//!
//! This module wraps the host facilities the runtime is built on: execution
//! contexts (save/restore of the full register set plus signal mask) and
//! green thread stacks.
//!
//! Both are provided by Linux/glibc through [`libc`]; porting the runtime
//! means replacing this module.

pub(crate) mod context;
pub(crate) mod stack;

pub(crate) use context::Context;
pub(crate) use stack::Stack;
