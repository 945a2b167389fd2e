// 領域層：核心模型、設定與埠介面，不直接存取網路或磁碟。

pub mod model;
pub mod ports;
pub mod settings;
