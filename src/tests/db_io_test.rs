use crate::storage::{disk::manager::DiskManager, page::page::page_constants::PAGE_SIZE};

#[test]
fn db_io_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut manager = DiskManager::new(dir.path());

    let data = [1; PAGE_SIZE];
    let mut page_buffer = [0; PAGE_SIZE];

    let file_id = manager.create_file()?;
    let page_no = manager.allocate_page(file_id)?;

    manager.write_page(file_id, page_no, &data)?;
    manager.read_page(file_id, page_no, &mut page_buffer)?;

    assert_eq!(data, page_buffer, "page read mismatch");
    Ok(())
}

#[test]
fn files_keep_separate_page_spaces() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut manager = DiskManager::new(dir.path());

    let first = manager.create_file()?;
    let second = manager.create_file()?;

    // Page numbering restarts per file.
    assert_eq!(manager.allocate_page(first)?, 0);
    assert_eq!(manager.allocate_page(second)?, 0);
    assert_eq!(manager.allocate_page(first)?, 1);

    manager.write_page(first, 0, &[3; PAGE_SIZE])?;
    manager.write_page(second, 0, &[7; PAGE_SIZE])?;

    let mut buffer = [0; PAGE_SIZE];
    manager.read_page(first, 0, &mut buffer)?;
    assert_eq!(buffer, [3; PAGE_SIZE]);
    manager.read_page(second, 0, &mut buffer)?;
    assert_eq!(buffer, [7; PAGE_SIZE]);
    Ok(())
}

#[test]
fn evicted_descriptor_is_reopened_on_demand() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut manager = DiskManager::new(dir.path());

    let first = manager.create_file()?;
    let page_no = manager.allocate_page(first)?;
    manager.write_page(first, page_no, &[9; PAGE_SIZE])?;

    // Push the first file's descriptor out of the fd pool.
    for _ in 0..12 {
        let file = manager.create_file()?;
        manager.allocate_page(file)?;
    }

    let mut buffer = [0; PAGE_SIZE];
    manager.read_page(first, page_no, &mut buffer)?;
    assert_eq!(buffer, [9; PAGE_SIZE]);
    Ok(())
}
