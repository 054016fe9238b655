//! Composes the bundled backends: an in-memory filesystem as the root,
//! with a tar archive mounted read-only under `archive/`.

use std::io::Cursor;
use std::sync::Arc;

use mosaicfs::fs::{dispatch, file, FileMode, Fs};
use mosaicfs::mount::MountFs;
use mosaicfs::tar::{TarFs, TarOptions};
use mosaicfs::{mem, Result};

const BLOCK: usize = 512;

fn tar_entry(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut block = [0u8; BLOCK];
    block[..name.len()].copy_from_slice(name.as_bytes());
    block[100..107].copy_from_slice(b"0000644");
    block[108..115].copy_from_slice(b"0000000");
    block[116..123].copy_from_slice(b"0000000");
    block[124..135].copy_from_slice(format!("{:011o}", contents.len()).as_bytes());
    block[136..147].copy_from_slice(b"00000000000");
    block[156] = b'0';
    block[257..263].copy_from_slice(b"ustar\0");
    block[263..265].copy_from_slice(b"00");
    let mut sum: u64 = 0;
    for (idx, byte) in block.iter().enumerate() {
        sum += if (148..156).contains(&idx) { b' ' as u64 } else { *byte as u64 };
    }
    block[148..155].copy_from_slice(format!("{sum:06o}\0").as_bytes());

    let mut out = block.to_vec();
    out.extend_from_slice(contents);
    let partial = contents.len() % BLOCK;
    if partial != 0 {
        out.extend(std::iter::repeat(0u8).take(BLOCK - partial));
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let root = Arc::new(mem::new_fs().await?);
    let mut handle = dispatch::create(root.as_ref(), "hello.txt").await?;
    file::write(handle.as_mut(), b"hello from the in-memory root\n").await?;
    handle.close().await?;
    dispatch::mkdir(root.as_ref(), "archive", FileMode::new(0o755)).await?;

    let mut archive = tar_entry("greeting.txt", b"hello from the tar archive\n");
    archive.extend(std::iter::repeat(0u8).take(2 * BLOCK));
    let tar = TarFs::new(Cursor::new(archive), TarOptions::default()).await?;

    let composed = MountFs::new(root);
    composed.add_mount("archive", Arc::new(tar)).await?;

    for name in ["hello.txt", "archive/greeting.txt"] {
        let contents = dispatch::read_file(&composed, name).await?;
        print!("{name}: {}", String::from_utf8_lossy(&contents));
    }
    Ok(())
}
