// Scenario tests that drive a mock target through collections and check the inspector's model
// after every halt.
mod mock_tests;
