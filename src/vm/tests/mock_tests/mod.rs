// All the tests with prefix 'mock_test_' use MockRemoteVM. Each test builds its own mock target
// and inspector through the fixtures in `crate::util::test_util::fixtures`, so tests can share a
// module and run in parallel.

// Mock tests should have the prefix 'mock_test_' in their file name.

// Common includes for mock tests.
pub(crate) mod mock_test_prelude {
    pub use crate::reference::{ObjectStatus, RemoteReference};
    pub use crate::scheme::*;
    pub use crate::util::error::TeleError;
    pub use crate::util::test_util::fixtures::*;
    pub use crate::util::test_util::mock_vm::*;
    pub use crate::util::Address;
    pub use crate::vm::*;
}

mod mock_test_gen_semispace;
mod mock_test_inspector;
mod mock_test_marksweep;
mod mock_test_region_marksweep;
mod mock_test_semispace;
mod mock_test_semispace_missed_halts;
mod mock_test_stress;
