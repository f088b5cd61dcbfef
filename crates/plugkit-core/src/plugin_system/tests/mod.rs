mod metadata_tests;

mod support;
