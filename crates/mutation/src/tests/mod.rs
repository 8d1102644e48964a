mod memtable_tests;
