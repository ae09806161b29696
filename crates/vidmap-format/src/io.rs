//! 只读 I/O 抽象层.
//!
//! 为解封装器提供带缓冲的顺序读取, 以及按绝对偏移的随机字节区间读取.
//! 所有读取都是 "seek + read", 不涉及写入.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use vidmap_core::{VidError, VidResult};

/// I/O 上下文
///
/// 封装底层后端, 为解封装器与 [`MediaFile`](crate::MediaFile) 提供统一的读取接口.
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

/// 只读 I/O 后端 trait
///
/// 要求 `Send`, 使持有它的文件对象可以整体移交给工作线程.
pub trait IoBackend: Send {
    /// 读取数据到缓冲区, 返回 0 表示已到末尾
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 定位 (seek)
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小
    fn size(&self) -> u64;
}

/// 默认缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self {
            inner: backend,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            buf_len: 0,
            buf_pos: 0,
        }
    }

    /// 以只读二进制方式打开文件
    pub fn open_read(path: impl AsRef<Path>) -> VidResult<Self> {
        let file = std::fs::File::open(path)?;
        let backend = FileBackend::new(file)?;
        Ok(Self::new(Box::new(backend)))
    }

    /// 从内存数据创建
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self::new(Box::new(MemoryBackend::from_data(data)))
    }

    // ========================
    // 顺序读取
    // ========================

    /// 读取指定字节数, 数据不足时返回 [`VidError::Eof`]
    pub fn read_exact(&mut self, buf: &mut [u8]) -> VidResult<()> {
        let mut total_read = 0;
        while total_read < buf.len() {
            let buffered = self.buf_len - self.buf_pos;
            if buffered > 0 {
                let to_copy = buffered.min(buf.len() - total_read);
                buf[total_read..total_read + to_copy]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
                self.buf_pos += to_copy;
                total_read += to_copy;
            } else {
                self.buf_pos = 0;
                self.buf_len = self.inner.read(&mut self.buffer)?;
                if self.buf_len == 0 {
                    return Err(VidError::Eof);
                }
            }
        }
        Ok(())
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> VidResult<u8> {
        if self.buf_pos < self.buf_len {
            let b = self.buffer[self.buf_pos];
            self.buf_pos += 1;
            return Ok(b);
        }
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// 读取 u16 小端
    pub fn read_u16_le(&mut self) -> VidResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// 读取 u32 小端
    pub fn read_u32_le(&mut self) -> VidResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// 读取 u16 大端
    pub fn read_u16_be(&mut self) -> VidResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// 读取 u24 大端
    pub fn read_u24_be(&mut self) -> VidResult<u32> {
        let mut buf = [0u8; 3];
        self.read_exact(&mut buf)?;
        Ok((u32::from(buf[0]) << 16) | (u32::from(buf[1]) << 8) | u32::from(buf[2]))
    }

    /// 读取 u32 大端
    pub fn read_u32_be(&mut self) -> VidResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// 读取 i32 大端
    pub fn read_i32_be(&mut self) -> VidResult<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    /// 读取 u64 大端
    pub fn read_u64_be(&mut self) -> VidResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// 读取 4 字节标签 (FourCC)
    pub fn read_tag(&mut self) -> VidResult<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 读取指定数量的字节
    ///
    /// 超出文件剩余长度的请求直接返回 [`VidError::Eof`], 不预先分配.
    pub fn read_bytes(&mut self, count: usize) -> VidResult<Vec<u8>> {
        let remaining = self.size().saturating_sub(self.position()?);
        if count as u64 > remaining {
            return Err(VidError::Eof);
        }
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 跳过指定字节数
    pub fn skip(&mut self, count: u64) -> VidResult<()> {
        let buffered = (self.buf_len - self.buf_pos) as u64;
        if count <= buffered {
            self.buf_pos += count as usize;
            return Ok(());
        }
        let target = self.position()? + count;
        self.seek_to(target)?;
        Ok(())
    }

    // ========================
    // 定位
    // ========================

    /// 定位 (seek)
    ///
    /// 注意: seek 会清空读缓冲区.
    pub fn seek(&mut self, pos: SeekFrom) -> VidResult<u64> {
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(self.inner.seek(pos)?)
    }

    /// 定位到绝对偏移
    pub fn seek_to(&mut self, offset: u64) -> VidResult<u64> {
        self.seek(SeekFrom::Start(offset))
    }

    /// 获取当前位置
    ///
    /// 考虑读缓冲区中尚未消耗的数据量.
    pub fn position(&mut self) -> VidResult<u64> {
        let raw_pos = self.inner.position()?;
        let buffered = (self.buf_len - self.buf_pos) as u64;
        Ok(raw_pos - buffered)
    }

    /// 获取总大小
    pub fn size(&self) -> u64 {
        self.inner.size()
    }

    // ========================
    // 随机区间读取
    // ========================

    /// 从绝对偏移读取, 填满 `buf`
    ///
    /// 区间越过文件末尾时返回 [`VidError::InvalidArgument`].
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> VidResult<()> {
        check_range(offset, buf.len() as u64, self.size())?;
        self.seek_to(offset)?;
        self.read_exact(buf)
    }

    /// 读取 `[offset, offset + len)` 区间
    pub fn read_range(&mut self, offset: u64, len: u64) -> VidResult<Vec<u8>> {
        check_range(offset, len, self.size())?;
        let len = usize::try_from(len)
            .map_err(|_| VidError::InvalidArgument(format!("区间长度过大: {len}")))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| VidError::OutOfMemory(format!("读取区间 {len} 字节")))?;
        buf.resize(len, 0);
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }
}

fn check_range(offset: u64, len: u64, size: u64) -> VidResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(VidError::InvalidArgument(format!(
            "字节区间越界: offset={offset}, len={len}, file_size={size}"
        ))),
    }
}

/// 文件 I/O 后端
struct FileBackend {
    file: std::fs::File,
    size: u64,
}

impl FileBackend {
    fn new(file: std::fs::File) -> VidResult<Self> {
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// 内存缓冲区 I/O 后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// 获取内部数据的引用
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::End(offset) => self.data.len() as i64 + offset,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = usize::try_from(new_pos).unwrap_or(usize::MAX);
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_顺序读取() {
        let mut io = IoContext::from_memory(vec![
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, b'f', b't', b'y', b'p',
        ]);
        assert_eq!(io.read_u8().unwrap(), 0x01);
        assert_eq!(io.read_u16_be().unwrap(), 0x0203);
        assert_eq!(io.read_u32_le().unwrap(), 0x0706_0504);
        assert_eq!(&io.read_tag().unwrap(), b"ftyp");
        assert_eq!(io.position().unwrap(), 11);
        assert!(matches!(io.read_u8(), Err(VidError::Eof)));
    }

    #[test]
    fn test_跳过与定位() {
        let data: Vec<u8> = (0..=255).collect();
        let mut io = IoContext::from_memory(data);
        io.skip(10).unwrap();
        assert_eq!(io.read_u8().unwrap(), 10);
        io.skip(100).unwrap();
        assert_eq!(io.position().unwrap(), 111);
        io.seek_to(200).unwrap();
        assert_eq!(io.read_u24_be().unwrap(), 0xC8C9CA);
    }

    #[test]
    fn test_区间读取越界() {
        let mut io = IoContext::from_memory(vec![0xAA; 64]);
        assert_eq!(io.read_range(60, 4).unwrap(), vec![0xAA; 4]);
        assert_eq!(io.read_range(64, 0).unwrap(), Vec::<u8>::new());
        let err = io.read_range(61, 4).expect_err("越界区间应失败");
        assert!(matches!(err, VidError::InvalidArgument(_)));
        assert!(io.read_range(u64::MAX, 2).is_err());
    }

    #[test]
    fn test_超长读取不预分配() {
        let mut io = IoContext::from_memory(vec![0; 8]);
        assert!(matches!(io.read_bytes(1 << 40), Err(VidError::Eof)));
        assert_eq!(io.read_bytes(8).unwrap().len(), 8);
    }

    #[test]
    fn test_文件后端() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, &[1, 2, 3, 4, 5]).unwrap();
        let mut io = IoContext::open_read(tmp.path()).unwrap();
        assert_eq!(io.size(), 5);
        assert_eq!(io.read_range(1, 3).unwrap(), vec![2, 3, 4]);
    }
}
