use std::sync::Arc;

use bitcoin::opcodes::Opcode;
use tracing::debug;

use super::preimage::SigVersion;
use super::{
    parse_lossy, ContractViolation, ScriptError, ScriptFlags, ScriptToken, MAX_SCRIPT_SIZE,
};

/// Where a program stands in its evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Executing,
    /// Every token ran. Whether the final stack satisfies the spend is the
    /// caller's decision.
    Valid,
    Invalid(ScriptError),
}

impl Validity {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Validity::Executing)
    }

    pub fn error(self) -> Option<ScriptError> {
        match self {
            Validity::Invalid(err) => Some(err),
            _ => None,
        }
    }
}

/// Execution state of one script.
///
/// Stacks are stored bottom first, so the top element is the last one. The
/// remaining script is a cursor into the shared original token sequence.
#[derive(Debug, Clone)]
pub struct ScriptProgram {
    pub(crate) stack: Vec<ScriptToken>,
    pub(crate) alt_stack: Vec<ScriptToken>,
    original_script: Arc<[ScriptToken]>,
    position: usize,
    pub(crate) last_code_separator: Option<usize>,
    flags: ScriptFlags,
    sig_version: SigVersion,
    validity: Validity,
    pub(crate) exec_stack: Vec<bool>,
    pub(crate) op_count: usize,
    unparsed_tail: Option<Arc<[u8]>>,
}

impl ScriptProgram {
    pub fn new(script: Vec<ScriptToken>, flags: ScriptFlags) -> Self {
        Self {
            stack: Vec::new(),
            alt_stack: Vec::new(),
            original_script: script.into(),
            position: 0,
            last_code_separator: None,
            flags,
            sig_version: SigVersion::Base,
            validity: Validity::Executing,
            exec_stack: Vec::new(),
            op_count: 0,
            unparsed_tail: None,
        }
    }

    /// Decodes raw script bytes.
    ///
    /// Oversized scripts start out invalid. A truncated trailing push is kept
    /// as an unparsed tail, which fails with `BadOpcode` once execution
    /// reaches it.
    pub fn from_bytes(bytes: &[u8], flags: ScriptFlags) -> Self {
        let (tokens, tail) = parse_lossy(bytes);
        let mut program = Self::new(tokens, flags);
        program.unparsed_tail = tail.map(Into::into);
        if bytes.len() > MAX_SCRIPT_SIZE {
            program = program.fail(ScriptError::ScriptSize);
        }
        program
    }

    /// Replaces the data stack; `stack` is given bottom first.
    pub fn with_stack(mut self, stack: Vec<ScriptToken>) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_alt_stack(mut self, alt_stack: Vec<ScriptToken>) -> Self {
        self.alt_stack = alt_stack;
        self
    }

    pub fn with_sig_version(mut self, sig_version: SigVersion) -> Self {
        self.sig_version = sig_version;
        self
    }

    /// Data stack, bottom first.
    pub fn stack(&self) -> &[ScriptToken] {
        &self.stack
    }

    /// Data stack, top first.
    pub fn stack_top_first(&self) -> Vec<ScriptToken> {
        self.stack.iter().rev().cloned().collect()
    }

    pub fn into_stack(self) -> Vec<ScriptToken> {
        self.stack
    }

    pub fn alt_stack(&self) -> &[ScriptToken] {
        &self.alt_stack
    }

    /// Tokens not yet executed.
    pub fn script(&self) -> &[ScriptToken] {
        &self.original_script[self.position..]
    }

    pub fn original_script(&self) -> &[ScriptToken] {
        &self.original_script
    }

    /// Index of the last executed OP_CODESEPARATOR in the original script.
    pub fn last_code_separator(&self) -> Option<usize> {
        self.last_code_separator
    }

    pub fn flags(&self) -> ScriptFlags {
        self.flags
    }

    pub fn sig_version(&self) -> SigVersion {
        self.sig_version
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    pub fn is_executing(&self) -> bool {
        self.validity == Validity::Executing
    }

    pub fn unparsed_tail(&self) -> Option<&[u8]> {
        self.unparsed_tail.as_deref()
    }

    /// Number of non-push operations counted so far.
    pub fn op_count(&self) -> usize {
        self.op_count
    }

    /// True when every enclosing conditional branch is taken.
    pub fn is_branch_executed(&self) -> bool {
        self.exec_stack.iter().all(|taken| *taken)
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn advance(&mut self, tokens: usize) {
        self.position = (self.position + tokens).min(self.original_script.len());
    }

    /// Terminates the program with `err`.
    pub(crate) fn fail(mut self, err: ScriptError) -> Self {
        if self.is_executing() {
            debug!(error = %err, position = self.position, "script failed");
            self.validity = Validity::Invalid(err);
        }
        self
    }

    /// Closes out a program whose script has been fully consumed.
    pub(crate) fn finish(self) -> Self {
        if !self.is_executing() {
            return self;
        }
        if self.unparsed_tail.is_some() {
            return self.fail(ScriptError::BadOpcode);
        }
        if !self.exec_stack.is_empty() {
            return self.fail(ScriptError::UnbalancedConditional);
        }
        let mut program = self;
        program.validity = Validity::Valid;
        program
    }

    /// Checks that `op` is next and steps past it.
    pub(crate) fn consume(mut self, op: Opcode) -> Result<Self, ContractViolation> {
        self.expect_head(op)?;
        self.advance(1);
        Ok(self)
    }

    /// Checks that `op` is the next token to execute.
    pub(crate) fn expect_head(&self, op: Opcode) -> Result<(), ContractViolation> {
        match self.script().first() {
            Some(ScriptToken::Op(head)) if *head == op => Ok(()),
            found => Err(ContractViolation::UnexpectedHead {
                expected: op,
                found: found.cloned(),
            }),
        }
    }
}
