pub mod store_record;
