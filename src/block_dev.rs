use core::any::Any;
///
/// 教程说明：
/// 这是文件系统与具体硬件/驱动之间的最小抽象边界。
/// 文件系统只依赖“按扇区读写”，不关心块设备底层是 virtio、内存盘还是其他介质。
/// 本文件系统没有块缓存，每次读写都会直接落到设备上。

/// Trait for block devices
/// which reads and writes data in the unit of sectors
pub trait BlockDevice: Send + Sync + Any {
    /// Read one whole sector into `buf`
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// Write one whole sector from `buf`
    fn write_block(&self, block_id: usize, buf: &[u8]);
    /// Number of sectors on the device
    fn block_count(&self) -> usize;
}
