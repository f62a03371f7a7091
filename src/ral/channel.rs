//! Channel register block and fields

use super::{RORegister, RWRegister};

/// One channel's registers.
///
/// The controller repeats this block for every channel, with a stride
/// of 0x58 bytes.
#[repr(C)]
pub struct RegisterBlock {
    /// Source Address Register
    pub SAR: RWRegister<u32>,
    _reserved0: u32,
    /// Destination Address Register
    pub DAR: RWRegister<u32>,
    _reserved1: u32,
    /// Linked List Pointer Register
    pub LLP: RWRegister<u32>,
    _reserved2: u32,
    /// Control Register, low word
    pub CTL_LO: RWRegister<u32>,
    /// Control Register, high word
    pub CTL_HI: RWRegister<u32>,
    /// Source Status Register
    pub SSTAT: RORegister<u32>,
    _reserved3: u32,
    /// Destination Status Register
    pub DSTAT: RORegister<u32>,
    _reserved4: u32,
    /// Source Status Address Register
    pub SSTATAR: RWRegister<u32>,
    _reserved5: u32,
    /// Destination Status Address Register
    pub DSTATAR: RWRegister<u32>,
    _reserved6: u32,
    /// Configuration Register, low word
    pub CFG_LO: RWRegister<u32>,
    /// Configuration Register, high word
    pub CFG_HI: RWRegister<u32>,
    /// Source Gather Register
    pub SGR: RWRegister<u32>,
    _reserved7: u32,
    /// Destination Scatter Register
    pub DSR: RWRegister<u32>,
    _reserved8: u32,
}

const _: () = assert!(core::mem::size_of::<RegisterBlock>() == 0x58);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, CTL_LO) == 0x18);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, CFG_LO) == 0x40);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, DSR) == 0x50);

pub mod LLP {
    fields! {
        /// List master select
        LMS[0, 2],
        /// Address of the next linked list item, word aligned
        LOC[2, 30],
    }
}

pub mod CTL_LO {
    fields! {
        /// Interrupt enable
        INT_EN[0, 1],
        /// Destination transfer width
        DST_TR_WIDTH[1, 3],
        /// Source transfer width
        SRC_TR_WIDTH[4, 3],
        /// Destination address increment
        DINC[7, 2] { INCREMENT = 0b00, DECREMENT = 0b01, NO_CHANGE = 0b10 },
        /// Source address increment
        SINC[9, 2] { INCREMENT = 0b00, DECREMENT = 0b01, NO_CHANGE = 0b10 },
        /// Destination burst transaction length
        DEST_MSIZE[11, 3],
        /// Source burst transaction length
        SRC_MSIZE[14, 3],
        /// Source gather enable
        SRC_GATHER_EN[17, 1],
        /// Destination scatter enable
        DST_SCATTER_EN[18, 1],
        /// Transfer type and flow control
        TT_FC[20, 3],
        /// Destination master select
        DMS[23, 2],
        /// Source master select
        SMS[25, 2],
        /// Block chaining enable on the destination side
        LLP_DST_EN[27, 1],
        /// Block chaining enable on the source side
        LLP_SRC_EN[28, 1],
    }
}

pub mod CTL_HI {
    fields! {
        /// Block transfer size, in source transfer widths
        ///
        /// While a block is in flight, or after an error, this reads back
        /// the number of items already read from the source.
        BLOCK_TS[0, 12],
        /// Done bit, written back into the linked list item
        DONE[12, 1],
    }
}

pub mod CFG_LO {
    fields! {
        /// Channel priority
        CH_PRIOR[5, 3],
        /// Channel suspend
        CH_SUSP[8, 1],
        /// Channel FIFO status
        FIFO_EMPTY[9, 1],
        /// Destination software or hardware handshaking select
        HS_SEL_DST[10, 1] { HARDWARE = 0, SOFTWARE = 1 },
        /// Source software or hardware handshaking select
        HS_SEL_SRC[11, 1] { HARDWARE = 0, SOFTWARE = 1 },
        /// Destination handshaking interface polarity
        DST_HS_POL[18, 1],
        /// Source handshaking interface polarity
        SRC_HS_POL[19, 1],
        /// Maximum AMBA burst length
        MAX_ABRST[20, 10],
        /// Automatic source reload
        RELOAD_SRC[30, 1],
        /// Automatic destination reload
        RELOAD_DST[31, 1],
    }
}

pub mod CFG_HI {
    fields! {
        /// Flow control mode
        FCMODE[0, 1],
        /// FIFO mode select
        FIFO_MODE[1, 1],
        /// Protection control
        PROTCTL[2, 3],
        /// Destination status update enable
        DS_UPD_EN[5, 1],
        /// Source status update enable
        SS_UPD_EN[6, 1],
        /// Source hardware interface
        SRC_PER[7, 4],
        /// Destination hardware interface
        DEST_PER[11, 4],
    }
}

pub mod SGR {
    fields! {
        /// Source gather interval, in source transfer widths
        SGI[0, 20],
        /// Source gather count, in source transfer widths
        SGC[20, 12],
    }
}

pub mod DSR {
    fields! {
        /// Destination scatter interval, in destination transfer widths
        DSI[0, 20],
        /// Destination scatter count, in destination transfer widths
        DSC[20, 12],
    }
}
