//! The runtime's module initializer graph.
//!
//! Every module follows the initializer convention
//! `(builtin_flag, world_token) -> result_token`: the flag and token are
//! threaded through untouched, the token coming back is an ok/error ctor
//! whose reference the caller owns. A module flips its own "already
//! initialized" flag before running its body, so re-entry is a cheap
//! success even when the first run misreported.
//!
//! The graph below is the fixed dependency structure of the runtime
//! version this crate targets. Costs are the work units each body charges
//! to the meter; the deep transitive sum is what the selective bootstrap
//! avoids paying.

use log::trace;

use crate::{
    Allocator, CellId, CTOR_IO_ERROR, CTOR_IO_OK, Runtime, Value, io_result_is_error,
    release_token,
};

pub type ModuleId = usize;

/// Which revision of the runtime the graph models. The defective revision
/// ships a clock initializer whose first run reports the neutral outcome
/// (error code 0) through the error constructor; the status check reads
/// the constructor tag only, so it sees a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Revision {
    Clean,
    NeutralClockInit,
    /// A broken build whose clock initializer reports a genuine failure
    /// with [`CLOCK_FAIL_CODE`].
    FailingClockInit,
}

/// Error code the failing clock revision reports. Nonzero, so it is
/// distinguishable from the neutral misreport.
pub const CLOCK_FAIL_CODE: u32 = 19;

pub enum InitOutcome {
    Ok,
    /// "Nothing to do" misreported through the error constructor, code 0.
    Neutral,
    Fail(u32),
}

pub struct ModuleDesc {
    pub name: &'static str,
    pub deps: &'static [ModuleId],
    pub cost: u64,
    pub body: Option<fn(&mut Runtime) -> InitOutcome>,
}

pub const MOD_PRIMS: ModuleId = 0;
pub const MOD_NUMERICS: ModuleId = 1;
pub const MOD_TEXT: ModuleId = 2;
pub const MOD_FMT: ModuleId = 3;
pub const MOD_COLLECTIONS: ModuleId = 4;
pub const MOD_HASHING: ModuleId = 5;
pub const MOD_SYS: ModuleId = 6;
pub const MOD_CLOCK: ModuleId = 7;
pub const MOD_RNG: ModuleId = 8;
pub const MOD_IO: ModuleId = 9;
pub const MOD_TASKS: ModuleId = 10;
pub const MOD_META: ModuleId = 11;
pub const MOD_GUEST_RT: ModuleId = 12;

pub const MODULE_COUNT: usize = 13;

fn prims_init(rt: &mut Runtime) -> InitOutcome {
    // canonical inhabitants of the unsigned fixed-width types fall out of
    // this shallow initializer as a side effect
    rt.cells.set(CellId::U32Zero, Value::from_u64(0));
    rt.cells.set(CellId::U64Zero, Value::from_u64(0));
    InitOutcome::Ok
}

fn numerics_init(rt: &mut Runtime) -> InitOutcome {
    rt.cells.set(CellId::IntZero, Value::from_scalar(0));
    InitOutcome::Ok
}

fn collections_init(rt: &mut Runtime) -> InitOutcome {
    let mut empty = rt.allocate_scalar_array(&[]);
    empty.header.mark_persistent();
    rt.cells.set(CellId::EmptyBytes, empty.as_value());
    InitOutcome::Ok
}

fn clock_init(rt: &mut Runtime) -> InitOutcome {
    match rt.modules.revision {
        Revision::Clean => InitOutcome::Ok,
        Revision::NeutralClockInit => InitOutcome::Neutral,
        Revision::FailingClockInit => InitOutcome::Fail(CLOCK_FAIL_CODE),
    }
}

static MODULES: [ModuleDesc; MODULE_COUNT] = [
    ModuleDesc {
        name: "prims",
        deps: &[],
        cost: 40,
        body: Some(prims_init),
    },
    ModuleDesc {
        name: "numerics",
        deps: &[MOD_PRIMS],
        cost: 260,
        body: Some(numerics_init),
    },
    ModuleDesc {
        name: "text",
        deps: &[MOD_PRIMS, MOD_NUMERICS],
        cost: 310,
        body: None,
    },
    ModuleDesc {
        name: "fmt",
        deps: &[MOD_TEXT],
        cost: 480,
        body: None,
    },
    ModuleDesc {
        name: "collections",
        deps: &[MOD_PRIMS, MOD_NUMERICS],
        cost: 350,
        body: Some(collections_init),
    },
    ModuleDesc {
        name: "hashing",
        deps: &[MOD_COLLECTIONS],
        cost: 290,
        body: None,
    },
    ModuleDesc {
        name: "sys",
        deps: &[MOD_PRIMS],
        cost: 150,
        body: None,
    },
    ModuleDesc {
        name: "clock",
        deps: &[MOD_SYS],
        cost: 120,
        body: Some(clock_init),
    },
    ModuleDesc {
        name: "rng",
        deps: &[MOD_CLOCK, MOD_HASHING],
        cost: 180,
        body: None,
    },
    ModuleDesc {
        name: "io",
        deps: &[MOD_SYS, MOD_FMT],
        cost: 520,
        body: None,
    },
    ModuleDesc {
        name: "tasks",
        deps: &[MOD_IO, MOD_CLOCK],
        cost: 610,
        body: None,
    },
    ModuleDesc {
        name: "meta",
        deps: &[MOD_FMT, MOD_COLLECTIONS],
        cost: 740,
        body: None,
    },
    ModuleDesc {
        name: "guest_rt",
        deps: &[
            MOD_NUMERICS,
            MOD_COLLECTIONS,
            MOD_FMT,
            MOD_HASHING,
            MOD_RNG,
            MOD_IO,
            MOD_TASKS,
            MOD_META,
        ],
        cost: 90,
        body: None,
    },
];

pub fn module_name(id: ModuleId) -> &'static str {
    MODULES[id].name
}

/// Per-module "already initialized" flags plus the revision the graph runs
/// as. The flags flip before a body runs, which is exactly what the
/// ordering workaround exploits.
#[derive(Debug)]
pub struct ModuleRegistry {
    pub revision: Revision,
    initialized: [bool; MODULE_COUNT],
}

impl ModuleRegistry {
    pub fn new(revision: Revision) -> Self {
        Self {
            revision,
            initialized: [false; MODULE_COUNT],
        }
    }

    #[inline]
    pub fn is_initialized(&self, id: ModuleId) -> bool {
        self.initialized[id]
    }

    #[inline]
    pub(crate) fn set_initialized(&mut self, id: ModuleId) {
        self.initialized[id] = true;
    }
}

impl Runtime {
    /// Run one module initializer, `(builtin_flag, world_token) ->
    /// result_token`. Dependencies run first; a dependency's error token
    /// propagates upward unreleased, success tokens are released on the
    /// spot. The caller owns the returned token.
    pub fn init_module(&mut self, id: ModuleId, builtin: bool, world: Value) -> Value {
        if self.modules.is_initialized(id) {
            return self.allocate_ctor(CTOR_IO_OK, world).as_value();
        }
        self.modules.set_initialized(id);

        let desc = &MODULES[id];
        trace!("init module {}", desc.name);
        for &dep in desc.deps {
            let token = self.init_module(dep, builtin, world);
            if io_result_is_error(token) {
                return token;
            }
            release_token(token);
        }

        self.tick(desc.cost);
        let outcome = match desc.body {
            Some(body) => body(self),
            None => InitOutcome::Ok,
        };
        match outcome {
            InitOutcome::Ok => self.allocate_ctor(CTOR_IO_OK, world).as_value(),
            InitOutcome::Neutral => self
                .allocate_ctor(CTOR_IO_ERROR, Value::from_u64(0))
                .as_value(),
            InitOutcome::Fail(code) => self
                .allocate_ctor(CTOR_IO_ERROR, Value::from_u64(code as u64))
                .as_value(),
        }
    }
}

/// Work units the full transitive initialization charges, core init
/// excluded. Kept next to the table so cost changes stay honest.
pub fn full_graph_cost() -> u64 {
    MODULES.iter().map(|m| m.cost).sum()
}

#[cfg(test)]
mod module_tests {
    use super::*;
    use crate::{RuntimeCreateInfo, io_result_error_code};

    fn runtime(revision: Revision) -> Runtime {
        Runtime::new(RuntimeCreateInfo {
            revision,
            ..Default::default()
        })
    }

    #[test]
    fn root_init_walks_the_whole_graph_once() {
        let mut rt = runtime(Revision::Clean);
        let token = rt.init_module(MOD_GUEST_RT, true, Value::unit());
        assert!(!io_result_is_error(token));
        release_token(token);

        for id in 0..MODULE_COUNT {
            assert!(rt.modules.is_initialized(id), "{} left out", module_name(id));
        }
        assert_eq!(rt.work(), full_graph_cost());
    }

    #[test]
    fn reinit_is_free() {
        let mut rt = runtime(Revision::Clean);
        let token = rt.init_module(MOD_GUEST_RT, true, Value::unit());
        release_token(token);
        let before = rt.work();

        let token = rt.init_module(MOD_GUEST_RT, true, Value::unit());
        assert!(!io_result_is_error(token));
        release_token(token);
        assert_eq!(rt.work(), before, "second init must not charge work");
    }

    #[test]
    fn shallow_prims_init_produces_the_unsigned_cells() {
        let mut rt = runtime(Revision::Clean);
        let token = rt.init_module(MOD_PRIMS, true, Value::unit());
        assert!(!io_result_is_error(token));
        release_token(token);

        assert_eq!(rt.cells.get(CellId::U32Zero), Some(Value::from_u64(0)));
        assert_eq!(rt.cells.get(CellId::U64Zero), Some(Value::from_u64(0)));
        assert!(!rt.cells.is_ready(CellId::EmptyBytes));
        assert!(!rt.cells.is_ready(CellId::IntZero));
        assert_eq!(rt.work(), MODULES[MOD_PRIMS].cost);
    }

    #[test]
    fn defective_clock_reports_neutral_error_once() {
        let mut rt = runtime(Revision::NeutralClockInit);
        let token = rt.init_module(MOD_CLOCK, true, Value::unit());
        assert!(io_result_is_error(token));
        assert_eq!(io_result_error_code(token), Some(0));
        release_token(token);

        // the flag flipped despite the misreport, re-entry succeeds
        let token = rt.init_module(MOD_CLOCK, true, Value::unit());
        assert!(!io_result_is_error(token));
        release_token(token);
    }

    #[test]
    fn failing_clock_reports_its_nonzero_code() {
        let mut rt = runtime(Revision::FailingClockInit);
        let token = rt.init_module(MOD_CLOCK, true, Value::unit());
        assert!(io_result_is_error(token));
        assert_eq!(io_result_error_code(token), Some(CLOCK_FAIL_CODE));
        release_token(token);
    }

    #[test]
    fn genuine_failure_code_propagates_to_the_root() {
        let mut rt = runtime(Revision::FailingClockInit);
        let token = rt.init_module(MOD_GUEST_RT, true, Value::unit());
        assert!(io_result_is_error(token));
        assert_eq!(io_result_error_code(token), Some(CLOCK_FAIL_CODE));
        release_token(token);
    }

    #[test]
    fn dependency_error_propagates_to_the_root() {
        let mut rt = runtime(Revision::NeutralClockInit);
        let token = rt.init_module(MOD_GUEST_RT, true, Value::unit());
        assert!(io_result_is_error(token));
        assert_eq!(io_result_error_code(token), Some(0));
        release_token(token);
    }
}
