//! Scratch register allocation at edit points.
//!
//! A register is free at an edit point if, on every path leaving the point, it is overwritten
//! before it is read, or the path leaves the method first. Paths are followed along
//! [`successors`] inside a bounded [`RegisterWindow`]; a path that leaves the window counts as
//! a read, so the allocator may miss a free register but never hands out a live one.
//!
//! # Example
//!
//! ```rust,ignore
//! let allocator = RegisterAllocator::new(method, AllocatorPolicy::default())?;
//! let mut provider = allocator.provider(insert_index, 3, &[view_register])?;
//! let free = provider.next_register()?;
//! let identifier = provider.next_register()?;
//! let path = provider.next_register()?;
//! ```
//!
//! When the method runs out of registers the allocator returns [`Error::RegisterExhausted`].
//! Callers that can, move their code into a [`crate::editor::HelperMethod`] instead of growing
//! the host's register file.

use std::collections::HashSet;

use crate::{
    analysis::cfg::{successors, RegisterWindow},
    assembly::{Register, RegisterFile},
    metadata::{Method, MethodImplementation},
    Error, Result,
};

/// Tuning of the register allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorPolicy {
    /// Maximum number of instructions examined from an edit point
    pub window_limit: usize,
    /// Register count at or above which generated code goes into a helper method up front.
    /// `None` only falls back to a helper on exhaustion.
    pub helper_register_threshold: Option<u16>,
}

impl Default for AllocatorPolicy {
    fn default() -> Self {
        Self {
            window_limit: 2000,
            helper_register_threshold: None,
        }
    }
}

impl AllocatorPolicy {
    /// Small window and an early helper fallback, for very large methods.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            window_limit: 250,
            helper_register_threshold: Some(200),
        }
    }

    /// Always generate into helper methods.
    #[must_use]
    pub fn helper_always() -> Self {
        Self {
            window_limit: 2000,
            helper_register_threshold: Some(0),
        }
    }

    /// Returns true if a method with `register_count` registers should use a helper up front.
    #[must_use]
    pub fn prefers_helper(&self, register_count: u16) -> bool {
        self.helper_register_threshold
            .is_some_and(|threshold| register_count >= threshold)
    }
}

/// Liveness queries over one method body.
pub struct RegisterAllocator<'a> {
    body: &'a MethodImplementation,
    file: RegisterFile,
    policy: AllocatorPolicy,
}

impl<'a> RegisterAllocator<'a> {
    /// Creates an allocator for `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoImplementation`] for abstract and native methods.
    pub fn new(method: &'a Method, policy: AllocatorPolicy) -> Result<Self> {
        let body = method.implementation_or_err()?;
        let file = RegisterFile {
            register_count: body.register_count(),
            parameter_registers: method.parameter_registers(),
        };
        Ok(Self { body, file, policy })
    }

    /// The policy in use.
    #[must_use]
    pub fn policy(&self) -> &AllocatorPolicy {
        &self.policy
    }

    /// Returns true if the policy asks for a helper method regardless of liveness.
    #[must_use]
    pub fn prefers_helper(&self) -> bool {
        self.policy.prefers_helper(self.file.register_count)
    }

    /// Returns true if `register` may be clobbered at `index`.
    ///
    /// # Errors
    ///
    /// Propagates control flow errors of broken bodies.
    pub fn is_free(&self, index: usize, register: Register) -> Result<bool> {
        let window = RegisterWindow::compute(self.body, index, self.policy.window_limit)?;
        self.is_free_in(&window, register)
    }

    /// Every register the walk from `index` finds read before written.
    ///
    /// # Errors
    ///
    /// Propagates control flow errors of broken bodies.
    pub fn live_registers(&self, index: usize) -> Result<Vec<Register>> {
        let window = RegisterWindow::compute(self.body, index, self.policy.window_limit)?;
        let mut live = Vec::new();
        for register in 0..self.file.register_count {
            if !self.is_free_in(&window, register)? {
                live.push(register);
            }
        }
        Ok(live)
    }

    /// Lowest free register at `index` that is not in `busy`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegisterExhausted`] if there is none.
    pub fn find_free_register(&self, index: usize, busy: &[Register]) -> Result<Register> {
        self.find_free_register_below(index, busy, Register::MAX)
    }

    /// Lowest free register at `index` that is not in `busy` and not above `max`.
    ///
    /// `max` is the operand limit of the instructions the register will be used in, `15` for
    /// 4 bit slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegisterExhausted`] if there is none.
    pub fn find_free_register_below(
        &self,
        index: usize,
        busy: &[Register],
        max: Register,
    ) -> Result<Register> {
        let window = RegisterWindow::compute(self.body, index, self.policy.window_limit)?;
        self.first_free(&window, index, busy, max)
    }

    /// Allocates `count` distinct free registers at `index` up front.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegisterExhausted`] with the number still missing if fewer than `count`
    /// registers are free.
    pub fn provider(
        &self,
        index: usize,
        count: usize,
        busy: &[Register],
    ) -> Result<FreeRegisterProvider> {
        self.provider_below(index, count, busy, Register::MAX)
    }

    /// [`RegisterAllocator::provider`] with an upper bound on the registers returned.
    ///
    /// # Errors
    ///
    /// See [`RegisterAllocator::provider`].
    pub fn provider_below(
        &self,
        index: usize,
        count: usize,
        busy: &[Register],
        max: Register,
    ) -> Result<FreeRegisterProvider> {
        let window = RegisterWindow::compute(self.body, index, self.policy.window_limit)?;
        let mut taken: Vec<Register> = busy.to_vec();
        let mut registers = Vec::with_capacity(count);

        for found in 0..count {
            match self.first_free(&window, index, &taken, max) {
                Ok(register) => {
                    taken.push(register);
                    registers.push(register);
                }
                Err(Error::RegisterExhausted { .. }) => {
                    return Err(Error::RegisterExhausted {
                        index,
                        requested: count - found,
                    })
                }
                Err(other) => return Err(other),
            }
        }

        log::debug!("allocated {:?} at {} (busy {:?})", registers, index, busy);
        Ok(FreeRegisterProvider {
            registers,
            next: 0,
            excluded: busy.to_vec(),
        })
    }

    fn first_free(
        &self,
        window: &RegisterWindow,
        index: usize,
        busy: &[Register],
        max: Register,
    ) -> Result<Register> {
        let highest = self.file.register_count.min(max.saturating_add(1));
        for register in 0..highest {
            if busy.contains(&register) {
                continue;
            }
            if self.is_free_in(window, register)? {
                return Ok(register);
            }
        }
        Err(Error::RegisterExhausted {
            index,
            requested: 1,
        })
    }

    /// Depth first walk over the window. A register is live as soon as one path reads it
    /// before writing it, or leaves the window.
    fn is_free_in(&self, window: &RegisterWindow, register: Register) -> Result<bool> {
        if register >= self.file.register_count {
            return Ok(false);
        }
        if window.is_empty() {
            return Ok(true);
        }

        let stream = self.body.instructions();
        let mut visited = HashSet::new();
        let mut stack = vec![window.start];

        while let Some(index) = stack.pop() {
            if !visited.insert(index) {
                continue;
            }
            if !window.contains(index) {
                return Ok(false);
            }

            let instruction = stream.get_or_err(index)?;
            if instruction.reads().contains(&register) {
                return Ok(false);
            }
            if instruction.writes().contains(&register) {
                // a throwing instruction leaves its destination untouched for the handler
                if instruction.opcode.info().can_throw {
                    stack.extend(self.body.handlers_covering(index));
                }
                continue;
            }
            stack.extend(successors(self.body, index)?);
        }

        Ok(true)
    }
}

/// Registers allocated up front, handed out one at a time.
#[derive(Debug, Clone)]
pub struct FreeRegisterProvider {
    registers: Vec<Register>,
    next: usize,
    excluded: Vec<Register>,
}

impl FreeRegisterProvider {
    /// The next allocated register.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegisterExhausted`] once every allocated register was handed out.
    pub fn next_register(&mut self) -> Result<Register> {
        let register = self
            .registers
            .get(self.next)
            .copied()
            .ok_or(Error::RegisterExhausted {
                index: self.next,
                requested: 1,
            })?;
        self.next += 1;
        Ok(register)
    }

    /// Number of registers not handed out yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.registers.len() - self.next
    }

    /// Every allocated register plus the registers excluded at creation, for chaining a second
    /// allocation at another edit point.
    #[must_use]
    pub fn used_and_unavailable(&self) -> Vec<Register> {
        let mut all = self.registers.clone();
        all.extend(self.excluded.iter().filter(|r| !self.registers.contains(r)));
        all
    }
}

/// Lowest free register at `index` of `method` not in `busy`, with the default policy.
///
/// # Errors
///
/// [`Error::NoImplementation`] or [`Error::RegisterExhausted`].
pub fn find_free_register(method: &Method, index: usize, busy: &[Register]) -> Result<Register> {
    RegisterAllocator::new(method, AllocatorPolicy::default())?.find_free_register(index, busy)
}
