mod db_io_test;
